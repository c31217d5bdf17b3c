//! Feasible-profile planning for buffer devices.
//!
//! Devices hand a [`BufferRequest`] to a [`BufferPlanner`] and get back a
//! profile that keeps the stored energy within `[0, capacity]` after every
//! interval. Infeasible requests are not errors: the planner returns its best
//! effort and the device simply reports a poor improvement.

use crate::profile::Profile;

const EPS: f64 = 1e-9;

/// Largest discrete planning table (`intervals * grid width`) accepted by
/// configuration validation.
pub const MAX_DISCRETE_STATES: usize = 20_000_000;

/// Power constraints for one planning request.
#[derive(Debug, Clone, Copy)]
pub enum PowerLimits<'a> {
    /// Any power between `min_w` and `max_w` in every interval.
    Continuous { min_w: f64, max_w: f64 },
    /// One of `levels_w` in every interval; the chosen levels must deliver
    /// exactly `required_wh` over the request.
    ///
    /// Levels are whole watts (fractions are rounded). The planner's table
    /// grows with `max(levels) / gcd(levels)`; see [`discrete_table_size`].
    Discrete { levels_w: &'a [f64], required_wh: f64 },
}

/// Everything a planner needs to produce a feasible profile.
#[derive(Debug, Clone, Copy)]
pub struct BufferRequest<'a> {
    /// Profile the device would like to follow (W).
    pub desired: &'a [f64],
    /// Storage capacity (Wh).
    pub capacity_wh: f64,
    /// Stored energy before the first interval (Wh).
    pub initial_wh: f64,
    /// Stored energy required after the last interval (Wh). Continuous mode only.
    pub target_wh: f64,
    /// Exogenous demand drawn from storage per interval (W). Empty means none.
    pub demand_w: &'a [f64],
    /// Static losses per interval (W). Empty means none.
    pub losses_w: &'a [f64],
    /// Interval length (h).
    pub dt_hours: f64,
    /// Power constraints.
    pub power: PowerLimits<'a>,
}

impl BufferRequest<'_> {
    fn drain_w(&self, t: usize) -> f64 {
        self.demand_w.get(t).copied().unwrap_or(0.0) + self.losses_w.get(t).copied().unwrap_or(0.0)
    }
}

/// Produces a feasible profile for a buffer device.
pub trait BufferPlanner: Send + Sync {
    /// Returns a profile of `request.desired.len()` values.
    fn plan(&self, request: &BufferRequest<'_>) -> Profile;
}

/// Planner minimising `||profile - desired||²` subject to the buffer limits.
///
/// Continuous requests start from a feasible profile and improve it with
/// pairwise power exchanges between intervals. Discrete requests are solved
/// exactly by dynamic programming over delivered energy.
#[derive(Debug, Clone, Copy)]
pub struct PairwisePlanner {
    /// Exchange budget per interval in continuous mode.
    pub exchanges_per_interval: usize,
    /// Smallest objective gain (W²) worth another exchange.
    pub min_gain: f64,
}

impl Default for PairwisePlanner {
    fn default() -> Self {
        Self {
            exchanges_per_interval: 4,
            min_gain: 1e-6,
        }
    }
}

impl BufferPlanner for PairwisePlanner {
    fn plan(&self, request: &BufferRequest<'_>) -> Profile {
        match request.power {
            PowerLimits::Continuous { min_w, max_w } => {
                self.plan_continuous(request, min_w.min(max_w), max_w.max(min_w))
            }
            PowerLimits::Discrete {
                levels_w,
                required_wh,
            } => plan_discrete(request, levels_w, required_wh),
        }
    }
}

fn bound(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// Stored energy after each interval.
fn stored_levels(initial_wh: f64, x: &[f64], drain: &[f64], dt: f64) -> Vec<f64> {
    let mut level = initial_wh;
    x.iter()
        .zip(drain)
        .map(|(p, d)| {
            level += (p - d) * dt;
            level
        })
        .collect()
}

impl PairwisePlanner {
    fn plan_continuous(&self, req: &BufferRequest<'_>, min_w: f64, max_w: f64) -> Profile {
        let n = req.desired.len();
        if n == 0 {
            return Vec::new();
        }
        let dt = req.dt_hours;
        let cap = req.capacity_wh;
        let drain: Vec<f64> = (0..n).map(|t| req.drain_w(t)).collect();

        // 1. Hold the stored energy level, then clip to [0, capacity]
        let mut x: Vec<f64> = drain.iter().map(|d| bound(*d, min_w, max_w)).collect();
        let mut level = req.initial_wh;
        for t in 0..n {
            let next = level + (x[t] - drain[t]) * dt;
            if next > cap {
                x[t] = bound(x[t] - (next - cap) / dt, min_w, max_w);
            } else if next < 0.0 {
                x[t] = bound(x[t] - next / dt, min_w, max_w);
            }
            level += (x[t] - drain[t]) * dt;
        }
        let mut levels = stored_levels(req.initial_wh, &x, &drain, dt);

        // 2. Close the gap to the target as early as possible
        let mut gap = req.target_wh - levels[n - 1];
        for t in 0..n {
            if gap.abs() <= EPS {
                break;
            }
            let step = if gap > 0.0 {
                let room = levels[t..]
                    .iter()
                    .map(|l| cap - l)
                    .fold(f64::INFINITY, f64::min);
                (max_w - x[t]).min(gap / dt).min(room / dt).max(0.0)
            } else {
                let room = levels[t..].iter().copied().fold(f64::INFINITY, f64::min);
                -(x[t] - min_w).min(-gap / dt).min(room / dt).max(0.0)
            };
            if step != 0.0 {
                x[t] += step;
                for l in &mut levels[t..] {
                    *l += step * dt;
                }
                gap -= step * dt;
            }
        }

        // 3. Pairwise exchanges keep total energy and the final level fixed
        self.exchange(req.desired, &mut x, &mut levels, cap, min_w, max_w, dt);
        x
    }

    #[expect(clippy::too_many_arguments)]
    fn exchange(
        &self,
        desired: &[f64],
        x: &mut [f64],
        levels: &mut [f64],
        cap: f64,
        min_w: f64,
        max_w: f64,
        dt: f64,
    ) {
        let n = x.len();
        for _ in 0..self.exchanges_per_interval * n {
            // (from, to, delta, gain)
            let mut best: Option<(usize, usize, f64, f64)> = None;

            for i in 0..n {
                let give = x[i] - min_w;
                if give <= EPS {
                    continue;
                }
                let gi = x[i] - desired[i];
                let consider = |j: usize, limit_w: f64, best: &mut Option<(usize, usize, f64, f64)>| {
                    let diff = gi - (x[j] - desired[j]);
                    if diff <= EPS {
                        return;
                    }
                    let delta = (diff / 2.0).min(give).min(max_w - x[j]).min(limit_w);
                    if delta <= EPS {
                        return;
                    }
                    let gain = 2.0 * delta * diff - 2.0 * delta * delta;
                    if best.is_none_or(|(_, _, _, g)| gain > g) {
                        *best = Some((i, j, delta, gain));
                    }
                };

                // Moving power later lowers the stored level in between
                let mut floor = f64::INFINITY;
                for j in i + 1..n {
                    floor = floor.min(levels[j - 1]);
                    consider(j, floor / dt, &mut best);
                }
                // Moving power earlier raises it
                let mut headroom = f64::INFINITY;
                for j in (0..i).rev() {
                    headroom = headroom.min(cap - levels[j]);
                    consider(j, headroom / dt, &mut best);
                }
            }

            let Some((i, j, delta, gain)) = best else {
                break;
            };
            if gain < self.min_gain {
                break;
            }
            x[i] -= delta;
            x[j] += delta;
            if i < j {
                for l in &mut levels[i..j] {
                    *l -= delta * dt;
                }
            } else {
                for l in &mut levels[j..i] {
                    *l += delta * dt;
                }
            }
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Power levels in whole watts, expressed as multiples of their gcd.
struct LevelGrid {
    ints: Vec<i64>,
    unit: i64,
    steps: Vec<i64>,
}

impl LevelGrid {
    fn new(levels_w: &[f64]) -> Self {
        let ints: Vec<i64> = levels_w.iter().map(|l| l.round() as i64).collect();
        let unit = ints.iter().fold(0, |g, &l| gcd(g, l.abs())).max(1);
        let steps = ints.iter().map(|l| l / unit).collect();
        Self { ints, unit, steps }
    }

    /// Reachable state range after `n` intervals, always containing 0.
    fn bounds(&self, n: usize) -> (i64, i64) {
        let n = n as i64;
        let lo = self.steps.iter().copied().min().unwrap_or(0).saturating_mul(n).min(0);
        let hi = self.steps.iter().copied().max().unwrap_or(0).saturating_mul(n).max(0);
        (lo, hi)
    }
}

/// Number of table entries the discrete planner allocates for `levels_w`
/// over `intervals`.
///
/// Returns `None` if a level is not a whole number of watts.
pub fn discrete_table_size(levels_w: &[f64], intervals: usize) -> Option<usize> {
    if levels_w.iter().any(|l| !l.is_finite() || (l - l.round()).abs() > EPS) {
        return None;
    }
    let (lo, hi) = LevelGrid::new(levels_w).bounds(intervals);
    let width = usize::try_from(hi.saturating_sub(lo).saturating_add(1)).unwrap_or(usize::MAX);
    Some(width.saturating_mul(intervals))
}

/// Exact discrete planning on the integer grid spanned by the power levels.
///
/// The state is the energy delivered so far, in units of `gcd(levels) * dt`.
/// If the required energy is unreachable, the closest reachable amount is
/// delivered instead (the lower one on ties).
fn plan_discrete(req: &BufferRequest<'_>, levels_w: &[f64], required_wh: f64) -> Profile {
    let n = req.desired.len();
    if n == 0 || levels_w.is_empty() {
        return vec![0.0; n];
    }
    let dt = req.dt_hours;

    let grid = LevelGrid::new(levels_w);
    let (ints, unit, steps) = (&grid.ints, grid.unit, &grid.steps);
    let (lo, hi) = grid.bounds(n);
    let width = (hi - lo + 1) as usize;
    let unit_wh = unit as f64 * dt;
    let target = (required_wh / unit_wh).round() as i64;
    let idx = |s: i64| (s - lo) as usize;

    let mut drained = 0.0;
    let mut cost = vec![f64::INFINITY; width];
    cost[idx(0)] = 0.0;
    let mut choice = vec![u16::MAX; n * width];

    for t in 0..n {
        drained += req.drain_w(t) * dt;
        let mut next = vec![f64::INFINITY; width];
        for (slot, &c) in cost.iter().enumerate() {
            if !c.is_finite() {
                continue;
            }
            let s = slot as i64 + lo;
            for (k, &step) in steps.iter().enumerate() {
                let ns = s + step;
                let level = req.initial_wh + ns as f64 * unit_wh - drained;
                if level < -EPS || level > req.capacity_wh + EPS {
                    continue;
                }
                let err = ints[k] as f64 - req.desired[t];
                let nc = c + err * err;
                let ni = idx(ns);
                if nc < next[ni] {
                    next[ni] = nc;
                    choice[t * width + ni] = k as u16;
                }
            }
        }
        cost = next;
    }

    let end = (lo..=hi)
        .filter(|&s| cost[idx(s)].is_finite())
        .min_by_key(|&s| ((s - target).abs(), s));
    let Some(mut s) = end else {
        return vec![0.0; n];
    };

    let mut profile = vec![0.0; n];
    for t in (0..n).rev() {
        let k = choice[t * width + idx(s)] as usize;
        profile[t] = ints[k] as f64;
        s -= steps[k];
    }
    profile
}
