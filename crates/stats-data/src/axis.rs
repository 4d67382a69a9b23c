//! Primary/secondary axis assignment.

use stats_core::models::AxisId;

/// Assign an axis to each valid series given their units, in input order.
///
/// * one series → primary
/// * two series with different units → primary, secondary
/// * two series sharing a unit, or three or more → all primary
///
/// The first-listed series is always on the primary axis.
pub fn assign_axes<S: AsRef<str>>(units: &[S]) -> Vec<AxisId> {
    let mut axes = vec![AxisId::Primary; units.len()];
    if let [first, second] = units {
        if first.as_ref() != second.as_ref() {
            axes[1] = AxisId::Secondary;
        }
    }
    axes
}
