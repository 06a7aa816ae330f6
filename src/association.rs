use crate::bbox::{BBox, Ltrb};
use crate::track::TrackedBox;

/// Assigns a plate box to the tracked vehicle that contains it.
///
/// A vehicle box contains the plate when all four plate edges are inside it, each edge
/// allowed to stick out by `tolerance` pixels. Among several containing vehicles the one
/// with the smallest area wins (earliest in `tracked` on equal areas). `None` means the
/// plate belongs to no tracked vehicle and the reading is discarded.
pub fn resolve(plate: &BBox<Ltrb>, tracked: &[TrackedBox], tolerance: f32) -> Option<u32> {
    let mut best: Option<(&TrackedBox, f32)> = None;

    for vehicle in tracked {
        if !vehicle.bbox.contains(plate, tolerance) {
            continue;
        }

        let area = vehicle.bbox.area();
        match best {
            Some((_, best_area)) if best_area <= area => {}
            _ => best = Some((vehicle, area)),
        }
    }

    best.map(|(vehicle, _)| vehicle.track_id)
}
