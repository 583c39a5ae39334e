/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Default absolute tolerance in cores.
pub const EPS_BASE: f64 = 0.95;

/// Fraction of a small bound used as its tolerance.
const BOUND_SCALE: f64 = 0.75;

/// Returns the deviation (in cores) allowed around a container's declared bound.
///
/// A fixed absolute tolerance is far too loose for small bounds, so the tolerance is scaled down
/// to three quarters of the bound whenever that is smaller than `eps_base`. The limit takes
/// precedence over the guarantee when both are set. With neither set the tolerance is reported
/// but never used to check anything.
///
/// # Arguments
///
/// * limit - declared CPU limit in cores, 0 if unset
/// * guarantee - declared CPU guarantee in cores, 0 if unset
/// * eps_base - the baseline tolerance
pub fn tolerance(limit: f64, guarantee: f64, eps_base: f64) -> f64 {
    if limit > 0.0 {
        (limit * BOUND_SCALE).min(eps_base)
    } else if guarantee > 0.0 {
        (guarantee * BOUND_SCALE).min(eps_base)
    } else {
        eps_base
    }
}
