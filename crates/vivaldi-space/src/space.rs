//! Normed vector spaces with a pluggable operation set.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SpaceError};
use crate::euclidean::euclidean_ops;
use crate::point::Point;
use crate::support::Support;

type DistanceFn<S> = Box<dyn Fn(&[S], &[S]) -> f64 + Send + Sync>;
type ScaleFn<S> = Box<dyn Fn(&[S], f64) -> Vec<S> + Send + Sync>;
type RandomFn<S> = Box<dyn Fn() -> S + Send + Sync>;
type ZeroFn<S> = Box<dyn Fn(usize) -> Vec<S> + Send + Sync>;

/// The operation set a space is built from.
///
/// All five operations are required; [`NormedVectorSpace::new`] rejects a set
/// with any of them missing.
pub struct SpaceOps<S> {
    distance: Option<DistanceFn<S>>,
    rescale: Option<ScaleFn<S>>,
    external_mul: Option<ScaleFn<S>>,
    random_element: Option<RandomFn<S>>,
    zero: Option<ZeroFn<S>>,
}

impl<S> Default for SpaceOps<S> {
    fn default() -> Self {
        Self {
            distance: None,
            rescale: None,
            external_mul: None,
            random_element: None,
            zero: None,
        }
    }
}

impl<S> SpaceOps<S> {
    /// Create an empty operation set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance between two coordinate vectors.
    #[must_use]
    pub fn with_distance(mut self, f: impl Fn(&[S], &[S]) -> f64 + Send + Sync + 'static) -> Self {
        self.distance = Some(Box::new(f));
        self
    }

    /// Divide a vector by a norm.
    #[must_use]
    pub fn with_rescale(mut self, f: impl Fn(&[S], f64) -> Vec<S> + Send + Sync + 'static) -> Self {
        self.rescale = Some(Box::new(f));
        self
    }

    /// Multiply a vector by a real scalar.
    #[must_use]
    pub fn with_external_mul(
        mut self,
        f: impl Fn(&[S], f64) -> Vec<S> + Send + Sync + 'static,
    ) -> Self {
        self.external_mul = Some(Box::new(f));
        self
    }

    /// Draw one random coordinate component.
    #[must_use]
    pub fn with_random_element(mut self, f: impl Fn() -> S + Send + Sync + 'static) -> Self {
        self.random_element = Some(Box::new(f));
        self
    }

    /// Build the zero vector of a given dimension.
    #[must_use]
    pub fn with_zero(mut self, f: impl Fn(usize) -> Vec<S> + Send + Sync + 'static) -> Self {
        self.zero = Some(Box::new(f));
        self
    }
}

/// A normed vector space of fixed dimension.
///
/// Immutable after construction and always handled through `Arc`, because
/// points keep a reference to the space they were created in.
pub struct NormedVectorSpace<S> {
    dimension: usize,
    distance: DistanceFn<S>,
    rescale: ScaleFn<S>,
    external_mul: ScaleFn<S>,
    random_element: RandomFn<S>,
    zero: ZeroFn<S>,
}

impl<S> fmt::Debug for NormedVectorSpace<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormedVectorSpace")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl<S: Support> NormedVectorSpace<S> {
    /// Build a space from a dimension and a complete operation set.
    pub fn new(dimension: usize, ops: SpaceOps<S>) -> Result<Arc<Self>> {
        if dimension == 0 {
            return Err(SpaceError::Configuration("dimension must be greater than 0"));
        }
        let SpaceOps {
            distance: Some(distance),
            rescale: Some(rescale),
            external_mul: Some(external_mul),
            random_element: Some(random_element),
            zero: Some(zero),
        } = ops
        else {
            return Err(SpaceError::Configuration("every space operation is required"));
        };

        Ok(Arc::new(Self {
            dimension,
            distance,
            rescale,
            external_mul,
            random_element,
            zero,
        }))
    }

    /// Euclidean space of the given dimension.
    pub fn euclidean(dimension: usize) -> Result<Arc<Self>> {
        Self::new(dimension, euclidean_ops())
    }

    /// Number of components of every point in this space.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether `point` was created in this exact space instance.
    pub fn owns(&self, point: &Point<S>) -> bool {
        std::ptr::eq(Arc::as_ptr(point.space()), self)
    }

    fn check(&self, point: &Point<S>) -> Result<()> {
        if self.owns(point) {
            Ok(())
        } else {
            Err(SpaceError::SpaceMismatch)
        }
    }

    /// The origin of this space.
    pub fn origin(self: &Arc<Self>) -> Point<S> {
        Point::from_parts(Arc::clone(self), (self.zero)(self.dimension))
    }

    /// Distance between two points of this space.
    pub fn distance(&self, first: &Point<S>, second: &Point<S>) -> Result<f64> {
        self.check(first)?;
        self.check(second)?;
        Ok((self.distance)(first.coordinates(), second.coordinates()))
    }

    /// Unit vector pointing from `second` toward `first`.
    ///
    /// Coincident points have no direction; a random non-degenerate one is
    /// drawn instead, so the result is always a unit vector.
    pub fn unit_vector(&self, first: &Point<S>, second: &Point<S>) -> Result<Point<S>> {
        let norm = self.distance(first, second)?;
        let space = Arc::clone(first.space());

        if norm != 0.0 {
            let diff: Vec<S> = first
                .coordinates()
                .iter()
                .zip(second.coordinates())
                .map(|(a, b)| *a - *b)
                .collect();
            return Point::new(&space, (self.rescale)(&diff, norm));
        }

        Point::new(&space, self.random_direction())
    }

    fn random_direction(&self) -> Vec<S> {
        let zero = (self.zero)(self.dimension);
        loop {
            let sample: Vec<S> = (0..self.dimension).map(|_| (self.random_element)()).collect();
            let norm = (self.distance)(&sample, &zero);
            if norm != 0.0 && norm.is_finite() {
                return (self.rescale)(&sample, norm);
            }
        }
    }

    /// Scale every coordinate of `point` by `factor`.
    pub fn external_mul(&self, point: &Point<S>, factor: f64) -> Result<Point<S>> {
        self.check(point)?;
        Point::new(point.space(), (self.external_mul)(point.coordinates(), factor))
    }

    /// Elementwise sum `point + offset`.
    pub fn translate(&self, point: &Point<S>, offset: &Point<S>) -> Result<Point<S>> {
        self.check(point)?;
        self.check(offset)?;
        let sum = point
            .coordinates()
            .iter()
            .zip(offset.coordinates())
            .map(|(a, b)| *a + *b)
            .collect();
        Point::new(point.space(), sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::Complex64;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let err = NormedVectorSpace::<f64>::euclidean(0).unwrap_err();
        assert!(matches!(err, SpaceError::Configuration(_)));
    }

    #[test]
    fn missing_operation_is_rejected() {
        let ops = SpaceOps::<f64>::new()
            .with_distance(|_, _| 0.0)
            .with_rescale(|v, _| v.to_vec())
            .with_external_mul(|v, _| v.to_vec())
            .with_zero(|d| vec![0.0; d]);
        let err = NormedVectorSpace::new(2, ops).unwrap_err();
        assert_eq!(err, SpaceError::Configuration("every space operation is required"));
    }

    #[test]
    fn distance_rejects_foreign_points() {
        let a = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let b = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let pa = Point::new(&a, vec![0.0, 0.0]).unwrap();
        let pb = Point::new(&b, vec![1.0, 1.0]).unwrap();

        assert_eq!(a.distance(&pa, &pb), Err(SpaceError::SpaceMismatch));
        assert_eq!(b.distance(&pa, &pb), Err(SpaceError::SpaceMismatch));
        assert!(a.unit_vector(&pa, &pb).is_err());
        assert!(b.external_mul(&pa, 2.0).is_err());
    }

    #[test]
    fn euclidean_distance_3_4_5() {
        let space = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let a = space.origin();
        let b = Point::new(&space, vec![3.0, 4.0]).unwrap();
        assert!(approx(space.distance(&a, &b).unwrap(), 5.0));
    }

    #[test]
    fn unit_vector_points_from_second_to_first() {
        let space = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let a = space.origin();
        let b = Point::new(&space, vec![3.0, 4.0]).unwrap();

        let unit = space.unit_vector(&a, &b).unwrap();
        assert!(approx(unit.coordinates()[0], -0.6));
        assert!(approx(unit.coordinates()[1], -0.8));
    }

    #[test]
    fn unit_vector_of_coincident_points_is_random_unit() {
        let space = NormedVectorSpace::<f64>::euclidean(3).unwrap();
        let p = Point::new(&space, vec![1.0, 2.0, 3.0]).unwrap();

        for _ in 0..50 {
            let unit = space.unit_vector(&p, &p).unwrap();
            let len = space.distance(&unit, &space.origin()).unwrap();
            assert!(approx(len, 1.0));
        }
    }

    #[test]
    fn degenerate_direction_retries_zero_samples() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        // First three draws are zero, forcing one full retry of a 2-d sample
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ops = crate::euclidean::euclidean_ops::<f64>().with_random_element(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                0.0
            } else {
                1.0
            }
        });
        let space = NormedVectorSpace::new(2, ops).unwrap();
        let p = space.origin();

        let unit = space.unit_vector(&p, &p).unwrap();
        assert!(approx(space.distance(&unit, &space.origin()).unwrap(), 1.0));
        assert!(calls.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn external_mul_and_translate() {
        let space = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let p = Point::new(&space, vec![-0.6, -0.8]).unwrap();

        let scaled = space.external_mul(&p, 1.25).unwrap();
        assert!(approx(scaled.coordinates()[0], -0.75));
        assert!(approx(scaled.coordinates()[1], -1.0));

        let moved = space.translate(&scaled, &p).unwrap();
        assert!(approx(moved.coordinates()[0], -1.35));
        assert!(approx(moved.coordinates()[1], -1.8));
    }

    #[test]
    fn complex_space_distance() {
        let space = NormedVectorSpace::<Complex64>::euclidean(1).unwrap();
        let a = space.origin();
        let b = Point::new(&space, vec![Complex64::new(3.0, 4.0)]).unwrap();
        assert!(approx(space.distance(&a, &b).unwrap(), 5.0));

        let unit = space.unit_vector(&b, &a).unwrap();
        assert_eq!(unit.coordinates()[0], Complex64::new(0.6, 0.8));
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(
            a in proptest::collection::vec(-1e6f64..1e6, 4),
            b in proptest::collection::vec(-1e6f64..1e6, 4),
        ) {
            let space = NormedVectorSpace::<f64>::euclidean(4).unwrap();
            let pa = Point::new(&space, a).unwrap();
            let pb = Point::new(&space, b).unwrap();
            prop_assert_eq!(space.distance(&pa, &pb).unwrap(), space.distance(&pb, &pa).unwrap());
        }

        #[test]
        fn self_distance_is_zero(a in proptest::collection::vec(-1e6f64..1e6, 3)) {
            let space = NormedVectorSpace::<f64>::euclidean(3).unwrap();
            let p = Point::new(&space, a).unwrap();
            prop_assert_eq!(space.distance(&p, &p).unwrap(), 0.0);
        }

        #[test]
        fn unit_vector_is_normalised(
            a in proptest::collection::vec(-1e3f64..1e3, 3),
            b in proptest::collection::vec(-1e3f64..1e3, 3),
        ) {
            let space = NormedVectorSpace::<f64>::euclidean(3).unwrap();
            let pa = Point::new(&space, a).unwrap();
            let pb = Point::new(&space, b).unwrap();
            let unit = space.unit_vector(&pa, &pb).unwrap();
            let len = space.distance(&unit, &space.origin()).unwrap();
            prop_assert!((len - 1.0).abs() < 1e-6);
        }
    }
}
