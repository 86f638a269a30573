//! Points bound to a single space.

use std::sync::Arc;

use crate::error::{Result, SpaceError};
use crate::space::NormedVectorSpace;
use crate::support::Support;

/// A coordinate vector owned by one [`NormedVectorSpace`].
///
/// Invariant: `coordinates().len() == space().dimension()`.
#[derive(Debug, Clone)]
pub struct Point<S> {
    space: Arc<NormedVectorSpace<S>>,
    coordinates: Vec<S>,
}

impl<S: Support> Point<S> {
    /// Create a point, failing if the vector length does not match the space.
    pub fn new(space: &Arc<NormedVectorSpace<S>>, coordinates: Vec<S>) -> Result<Self> {
        check_len(space, &coordinates)?;
        Ok(Self::from_parts(Arc::clone(space), coordinates))
    }

    pub(crate) fn from_parts(space: Arc<NormedVectorSpace<S>>, coordinates: Vec<S>) -> Self {
        Self { space, coordinates }
    }

    /// The owning space.
    pub fn space(&self) -> &Arc<NormedVectorSpace<S>> {
        &self.space
    }

    /// Coordinate components.
    pub fn coordinates(&self) -> &[S] {
        &self.coordinates
    }

    /// Consume the point, returning its components.
    pub fn into_coordinates(self) -> Vec<S> {
        self.coordinates
    }

    /// Replace the components in place.
    ///
    /// On a length mismatch the point is left untouched.
    pub fn set_coordinates(&mut self, coordinates: Vec<S>) -> Result<()> {
        check_len(&self.space, &coordinates)?;
        self.coordinates = coordinates;
        Ok(())
    }

    /// Whether both points reference the same space instance.
    pub fn same_space(&self, other: &Point<S>) -> bool {
        Arc::ptr_eq(&self.space, &other.space)
    }
}

impl<S: Support> PartialEq for Point<S> {
    fn eq(&self, other: &Self) -> bool {
        self.same_space(other) && self.coordinates == other.coordinates
    }
}

fn check_len<S: Support>(space: &NormedVectorSpace<S>, coordinates: &[S]) -> Result<()> {
    if coordinates.len() == space.dimension() {
        Ok(())
    } else {
        Err(SpaceError::DimensionMismatch {
            expected: space.dimension(),
            actual: coordinates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_checks_length() {
        let space = NormedVectorSpace::<f64>::euclidean(3).unwrap();
        assert!(Point::new(&space, vec![1.0, 2.0, 3.0]).is_ok());
        assert_eq!(
            Point::new(&space, vec![1.0, 2.0]).unwrap_err(),
            SpaceError::DimensionMismatch { expected: 3, actual: 2 }
        );
    }

    #[test]
    fn set_coordinates_leaves_point_on_mismatch() {
        let space = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let mut p = Point::new(&space, vec![1.0, 2.0]).unwrap();

        assert!(p.set_coordinates(vec![9.0]).is_err());
        assert_eq!(p.coordinates(), &[1.0, 2.0]);

        p.set_coordinates(vec![5.0, 6.0]).unwrap();
        assert_eq!(p.coordinates(), &[5.0, 6.0]);
    }

    #[test]
    fn equality_requires_same_space() {
        let a = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let b = NormedVectorSpace::<f64>::euclidean(2).unwrap();
        let pa = Point::new(&a, vec![1.0, 1.0]).unwrap();
        let pa2 = Point::new(&a, vec![1.0, 1.0]).unwrap();
        let pb = Point::new(&b, vec![1.0, 1.0]).unwrap();

        assert_eq!(pa, pa2);
        assert_ne!(pa, pb);
    }
}
