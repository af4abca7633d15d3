//! Travel costs from origin zones to point destinations.
//!
//! Costs are only known between zone centroids. A zone-to-point cost is estimated by routing to the
//! zone centroid nearest the point, then adding the time taken to cover the remaining straight-line
//! distance at a fixed speed.
use crate::destination::DestinationIndex;
use crate::error::ModelError;
use crate::matrix::{Matrix, check_shape};
use crate::zone::ZoneIndex;
use anyhow::{Result, ensure};
use log::{debug, info};
use ndarray::{Array1, ArrayBase, Data, Ix2, Zip};
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::time::Instant;

/// The default speed (m/s) at which the last leg to a destination is travelled (roughly 30mph)
pub const DEFAULT_SPEED: f64 = 13.0;

/// A zone centroid in the spatial index, tagged with its row index
type Centroid = GeomWithData<[f64; 2], usize>;

/// Which way trips are costed.
///
/// Zone-to-zone costs are asymmetric, so the cost of reaching a destination is not the same as the
/// cost of returning from it.
#[derive(
    SerializeLabeledStringEnum, DeserializeLabeledStringEnum, Debug, PartialEq, Clone, Copy, Default,
)]
pub enum CostDirection {
    /// Cost of travelling from each origin zone to the zone nearest the destination
    #[default]
    #[string = "origin_to_destination"]
    OriginToDestination,
    /// Cost of travelling from the zone nearest the destination back to each origin zone
    #[string = "destination_to_origin"]
    DestinationToOrigin,
}

/// Check that every cost is non-negative and not NaN (infinite costs mean "unreachable")
pub fn check_costs<S>(what: &str, costs: &ArrayBase<S, Ix2>) -> Result<()>
where
    S: Data<Elem = f64>,
{
    if let Some(((i, j), cost)) = costs
        .indexed_iter()
        .find(|(_, cost)| cost.is_nan() || **cost < 0.0)
    {
        anyhow::bail!("{what} contains an invalid cost ({cost}) at [{i}, {j}]");
    }

    Ok(())
}

/// Projects a zone-to-zone cost matrix onto point destinations
pub struct CostMatrixAugmenter {
    centroids: RTree<Centroid>,
    num_zones: usize,
    speed: f64,
    direction: CostDirection,
}

impl CostMatrixAugmenter {
    /// Build the spatial index of zone centroids.
    ///
    /// # Arguments
    ///
    /// * `zones` - The origin zones, whose centroids the base cost matrix is defined between
    /// * `speed` - Speed for the last leg to the destination, in metres per second
    /// * `direction` - Which way trips are costed
    pub fn new(zones: &ZoneIndex, speed: f64, direction: CostDirection) -> Result<Self> {
        ensure!(
            speed.is_finite() && speed > 0.0,
            "Speed must be a finite number greater than zero"
        );

        let centroids = zones
            .centroids()
            .map(|(zonei, point)| Centroid::new(point, zonei))
            .collect();

        Ok(Self {
            centroids: RTree::bulk_load(centroids),
            num_zones: zones.len(),
            speed,
            direction,
        })
    }

    /// Find the zone whose centroid is nearest to `point`.
    ///
    /// # Returns
    ///
    /// The zone's row index and the straight-line distance to its centroid, or `None` if there are
    /// no zones.
    pub fn nearest_zone(&self, point: [f64; 2]) -> Option<(usize, f64)> {
        let nearest = self.centroids.nearest_neighbor(&point)?;
        let [east, north] = *nearest.geom();
        let distance = (point[0] - east).hypot(point[1] - north);

        Some((nearest.data, distance))
    }

    /// Time (minutes) taken to travel `distance` metres on the last leg
    fn last_leg_minutes(&self, distance: f64) -> f64 {
        distance / self.speed / 60.0
    }

    /// Derive an origin-zone-to-destination cost matrix.
    ///
    /// # Arguments
    ///
    /// * `base_costs` - Zone-to-zone costs (M x M, minutes), where `base_costs[a, b]` is the cost of
    ///   travelling from zone `a` to zone `b`
    /// * `destinations` - The destinations to project the costs onto
    ///
    /// # Returns
    ///
    /// An M x N matrix where entry `[i, j]` is the cost of a trip between zone `i` and destination
    /// `j` in the configured direction.
    pub fn augment(&self, base_costs: &Matrix, destinations: &DestinationIndex) -> Result<Matrix> {
        let m = self.num_zones;
        check_shape("Zone cost matrix", base_costs, (m, m))?;
        check_costs("Zone cost matrix", base_costs)?;

        let start = Instant::now();
        let points: Vec<_> = destinations.iter().collect();
        let links = points
            .par_iter()
            .map(|dest| {
                let point = [dest.east, dest.north];
                let nearest = if point.iter().all(|x| x.is_finite()) {
                    self.nearest_zone(point)
                } else {
                    None
                };

                let (zonei, distance) =
                    nearest.ok_or_else(|| ModelError::GeometryResolutionFailure {
                        destination: dest.id.to_string(),
                    })?;

                Ok((zonei, self.last_leg_minutes(distance)))
            })
            .collect::<Result<Vec<_>>>()?;
        let (nearest, delta): (Vec<_>, Vec<_>) = links.into_iter().unzip();
        let (nearest, delta) = (Array1::from(nearest), Array1::from(delta));

        let mut costs = Matrix::zeros((m, destinations.len()));
        Zip::from(costs.columns_mut())
            .and(&nearest)
            .and(&delta)
            .par_for_each(|mut column, &zonei, &last_leg| {
                let via = match self.direction {
                    CostDirection::OriginToDestination => base_costs.column(zonei),
                    CostDirection::DestinationToOrigin => base_costs.row(zonei),
                };
                Zip::from(&mut column)
                    .and(via)
                    .for_each(|cost, &base| *cost = base + last_leg);
            });

        debug!(
            "Mean last-leg time to destinations: {:.3} minutes",
            delta.mean().unwrap_or(0.0)
        );
        info!(
            "Derived {}x{} destination cost matrix in {:.2?}",
            m,
            destinations.len(),
            start.elapsed()
        );

        Ok(costs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::PointLocation;
    use crate::fixture::{assert_error, destinations, zone_costs, zones};
    use float_cmp::assert_approx_eq;
    use ndarray::array;
    use rstest::rstest;

    fn point(id: &str, east: f64, north: f64) -> PointLocation {
        PointLocation {
            id: id.into(),
            east,
            north,
            attractiveness: 1.0,
        }
    }

    #[rstest]
    #[case([10.0, 10.0], 0, 200.0_f64.sqrt())]
    #[case([990.0, 0.0], 1, 10.0)]
    #[case([0.0, 1000.0], 2, 0.0)]
    fn test_nearest_zone(
        zones: ZoneIndex,
        #[case] point: [f64; 2],
        #[case] expected_zone: usize,
        #[case] expected_distance: f64,
    ) {
        let augmenter =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::default()).unwrap();
        let (zonei, distance) = augmenter.nearest_zone(point).unwrap();
        assert_eq!(zonei, expected_zone);
        assert_approx_eq!(f64, distance, expected_distance, epsilon = 1e-9);
    }

    #[rstest]
    fn test_augment_point_at_centroid(zones: ZoneIndex, zone_costs: Matrix) {
        // Points sitting exactly on a centroid cost the same as the zone itself
        let destinations = DestinationIndex::new(vec![
            point("a", 1000.0, 0.0),
            point("b", 0.0, 1000.0),
        ]);
        let augmenter =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::default()).unwrap();
        let costs = augmenter.augment(&zone_costs, &destinations).unwrap();

        assert_eq!(costs.dim(), (3, 2));
        assert_eq!(costs.column(0), zone_costs.column(1));
        assert_eq!(costs.column(1), zone_costs.column(2));
    }

    #[rstest]
    fn test_augment_adds_last_leg(zones: ZoneIndex, zone_costs: Matrix) {
        // 780m at 13 m/s is exactly one minute
        let destinations = DestinationIndex::new(vec![point("a", 1000.0, 780.0)]);
        let augmenter =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::default()).unwrap();
        let costs = augmenter.augment(&zone_costs, &destinations).unwrap();

        for i in 0..3 {
            assert_approx_eq!(f64, costs[[i, 0]], zone_costs[[i, 1]] + 1.0, epsilon = 1e-9);
        }
    }

    #[rstest]
    fn test_augment_direction(zones: ZoneIndex, zone_costs: Matrix) {
        let destinations = DestinationIndex::new(vec![point("a", 0.0, 0.0)]);
        let outbound =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::OriginToDestination)
                .unwrap()
                .augment(&zone_costs, &destinations)
                .unwrap();
        let inbound =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::DestinationToOrigin)
                .unwrap()
                .augment(&zone_costs, &destinations)
                .unwrap();

        assert_eq!(outbound.column(0), array![0.0, 12.0, 15.0]);
        assert_eq!(inbound.column(0), array![0.0, 10.0, 20.0]);
    }

    #[rstest]
    fn test_augment_wrong_shape(zones: ZoneIndex, destinations: DestinationIndex) {
        let augmenter =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::default()).unwrap();
        assert_error!(
            augmenter.augment(&Matrix::zeros((3, 2)), &destinations),
            "Zone cost matrix has dimensions 3x2 but the model requires 3x3"
        );
    }

    #[rstest]
    fn test_augment_no_zones(destinations: DestinationIndex) {
        let zones = ZoneIndex::default();
        let augmenter =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::default()).unwrap();
        let err = augmenter
            .augment(&Matrix::zeros((0, 0)), &destinations)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::GeometryResolutionFailure { .. })
        ));
    }

    #[rstest]
    fn test_augment_bad_coordinates(zones: ZoneIndex, zone_costs: Matrix) {
        let destinations = DestinationIndex::new(vec![point("nowhere", f64::NAN, 0.0)]);
        let augmenter =
            CostMatrixAugmenter::new(&zones, DEFAULT_SPEED, CostDirection::default()).unwrap();
        let err = augmenter.augment(&zone_costs, &destinations).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ModelError>(),
            Some(&ModelError::GeometryResolutionFailure {
                destination: "nowhere".into()
            })
        );
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_new_invalid_speed(zones: ZoneIndex, #[case] speed: f64) {
        assert!(CostMatrixAugmenter::new(&zones, speed, CostDirection::default()).is_err());
    }

    #[test]
    fn test_check_costs() {
        assert!(check_costs("Costs", &array![[0.0, f64::INFINITY]]).is_ok());
        assert_error!(
            check_costs("Costs", &array![[0.0, -1.0]]),
            "Costs contains an invalid cost (-1) at [0, 1]"
        );
        assert!(check_costs("Costs", &array![[f64::NAN]]).is_err());
    }
}
