//! ADSR-style decay envelope.

use libm::expf;

/// Exponential release is treated as finished once the value is within
/// this distance of the minimum.
const EXP_KILL_EPSILON: f32 = 1e-6;

/// Time constants elapsed at `time_release` for the exponential law
/// (5τ ≈ -96 dB, inaudible).
const EXP_TIME_CONSTANTS: f32 = 5.0;

/// Release law applied once the envelope is no longer held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Curve {
    /// `min + level·exp(-t/τ)`, killed within epsilon of `min`.
    #[default]
    Exponential,
    /// `level - k·t²`, killed at `time_release`.
    Parabolic,
    /// `level - k·t`, killed at `time_release`.
    Linear,
    /// Immediate kill on release.
    Delta,
}

/// A bounded scalar envelope driven by `trigger`/`release`/`update`.
///
/// The value ramps `min → max` over the attack time, decays toward the
/// sustain level, holds while the gate is held, then follows the release
/// curve back to `min`. An inactive envelope sits at `min` and ignores
/// `update` entirely.
#[derive(Clone, Debug)]
pub struct DecayEnvelope {
    min: f32,
    max: f32,
    value: f32,
    time_attack: f32,
    time_decay: f32,
    time_release: f32,
    sustain_level: f32,
    attack_slope: f32,
    decay_slope: f32,
    /// Elapsed time since the last trigger or release.
    total_time: f32,
    /// Value captured when the gate was released.
    release_level: f32,
    curve: Curve,
    active: bool,
    held: bool,
}

impl Default for DecayEnvelope {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.7, 0.3)
    }
}

impl DecayEnvelope {
    /// Create an envelope with the given attack/decay/release times (in
    /// seconds) and sustain level, bounded to `[0, 1]`.
    pub fn new(time_attack: f32, time_decay: f32, sustain_level: f32, time_release: f32) -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            value: 0.0,
            time_attack: time_attack.max(0.0),
            time_decay: time_decay.max(0.0),
            time_release: time_release.max(0.0),
            sustain_level: sustain_level.clamp(0.0, 1.0),
            attack_slope: 0.0,
            decay_slope: 0.0,
            total_time: 0.0,
            release_level: 0.0,
            curve: Curve::Exponential,
            active: false,
            held: false,
        }
    }

    /// Start (or re-start) the envelope.
    ///
    /// Slopes are recomputed and elapsed time reset only when `level`
    /// exceeds the current value: a louder re-trigger restarts the attack,
    /// a quieter one lets the current decay continue under the old slope.
    /// Documented policy, preserved from the source design.
    pub fn trigger(&mut self, level: f32) {
        if level > self.value {
            self.attack_slope = if self.time_attack > 0.0 {
                (self.max - self.value) / self.time_attack
            } else {
                0.0
            };
            self.decay_slope = if self.time_decay > 0.0 {
                (self.sustain_level - self.max) / self.time_decay
            } else {
                0.0
            };
            self.total_time = 0.0;
        }
        self.active = true;
        self.held = true;
    }

    /// Release the gate. Subsequent `update` calls follow the release curve.
    pub fn release(&mut self) {
        self.total_time = 0.0;
        self.release_level = self.value;
        self.held = false;
    }

    /// Force the envelope to its inactive resting state.
    pub fn kill(&mut self) {
        self.value = self.min;
        self.active = false;
        self.held = false;
    }

    /// Advance the envelope by `dt` seconds. No-op while inactive.
    pub fn update(&mut self, dt: f32) {
        if !self.active {
            return;
        }
        self.total_time += dt;

        if self.held {
            self.update_held(dt);
        } else {
            self.update_released();
        }
        self.value = self.value.clamp(self.min, self.max);
    }

    fn update_held(&mut self, dt: f32) {
        let t = self.total_time;
        if t <= self.time_attack {
            self.value = (self.value + self.attack_slope * dt).min(self.max);
        } else if t <= self.time_attack + self.time_decay {
            self.value = (self.value + self.decay_slope * dt).max(self.sustain_level);
        } else {
            self.value = self.sustain_level.max(self.min);
        }
    }

    fn update_released(&mut self) {
        let t = self.total_time;
        let span = self.release_level - self.min;
        match self.curve {
            Curve::Exponential => {
                let tau = self.time_release / EXP_TIME_CONSTANTS;
                if tau > 0.0 {
                    self.value = self.min + span * expf(-t / tau);
                } else {
                    self.value = self.min;
                }
                if self.value - self.min <= EXP_KILL_EPSILON {
                    self.kill();
                }
            }
            Curve::Parabolic => {
                if self.time_release > 0.0 && t < self.time_release {
                    let x = t / self.time_release;
                    self.value = self.release_level - span * x * x;
                } else {
                    self.kill();
                }
            }
            Curve::Linear => {
                if self.time_release > 0.0 && t < self.time_release {
                    self.value = self.release_level - span * (t / self.time_release);
                } else {
                    self.kill();
                }
            }
            Curve::Delta => {
                self.kill();
            }
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn set_curve(&mut self, curve: Curve) {
        self.curve = curve;
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn set_attack_time(&mut self, seconds: f32) {
        self.time_attack = seconds.max(0.0);
    }

    pub fn set_decay_time(&mut self, seconds: f32) {
        self.time_decay = seconds.max(0.0);
    }

    pub fn set_release_time(&mut self, seconds: f32) {
        self.time_release = seconds.max(0.0);
    }

    pub fn set_sustain_level(&mut self, level: f32) {
        self.sustain_level = level.clamp(self.min, self.max);
    }

    pub fn release_time(&self) -> f32 {
        self.time_release
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(env: &mut DecayEnvelope, dt: f32, steps: usize) {
        for _ in 0..steps {
            env.update(dt);
        }
    }

    #[test]
    fn inactive_update_is_noop() {
        let mut env = DecayEnvelope::default();
        env.update(1.0);
        assert_eq!(env.value(), 0.0);
        assert!(!env.is_active());
    }

    #[test]
    fn attack_ramps_to_max() {
        let mut env = DecayEnvelope::new(0.1, 0.1, 0.5, 0.1);
        env.trigger(1.0);
        step(&mut env, 0.01, 10);
        assert!((env.value() - 1.0).abs() < 0.05, "value = {}", env.value());
    }

    #[test]
    fn decay_settles_at_sustain() {
        let mut env = DecayEnvelope::new(0.1, 0.1, 0.5, 0.1);
        env.trigger(1.0);
        step(&mut env, 0.01, 30);
        assert!((env.value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sustain_holds_while_held() {
        let mut env = DecayEnvelope::new(0.01, 0.01, 0.6, 0.1);
        env.trigger(1.0);
        step(&mut env, 0.01, 100);
        assert!((env.value() - 0.6).abs() < 1e-6);
        assert!(env.is_active());
    }

    #[test]
    fn linear_release_reaches_min() {
        let mut env = DecayEnvelope::new(0.01, 0.01, 0.8, 0.1);
        env.set_curve(Curve::Linear);
        env.trigger(1.0);
        step(&mut env, 0.01, 10);
        env.release();
        step(&mut env, 0.01, 11);
        assert_eq!(env.value(), 0.0);
        assert!(!env.is_active());
    }

    #[test]
    fn parabolic_release_reaches_min() {
        let mut env = DecayEnvelope::new(0.01, 0.01, 0.8, 0.1);
        env.set_curve(Curve::Parabolic);
        env.trigger(1.0);
        step(&mut env, 0.01, 10);
        env.release();
        step(&mut env, 0.01, 11);
        assert_eq!(env.value(), 0.0);
        assert!(!env.is_active());
    }

    #[test]
    fn exponential_release_decays_and_kills() {
        let mut env = DecayEnvelope::new(0.01, 0.01, 0.8, 0.05);
        env.trigger(1.0);
        step(&mut env, 0.01, 10);
        env.release();
        let before = env.value();
        env.update(0.01);
        assert!(env.value() < before);
        // Well past 5 time constants the value is within epsilon of min
        step(&mut env, 0.05, 20);
        assert_eq!(env.value(), 0.0);
        assert!(!env.is_active());
    }

    #[test]
    fn delta_release_kills_immediately() {
        let mut env = DecayEnvelope::new(0.01, 0.01, 0.8, 0.1);
        env.set_curve(Curve::Delta);
        env.trigger(1.0);
        step(&mut env, 0.01, 5);
        env.release();
        env.update(0.001);
        assert_eq!(env.value(), 0.0);
        assert!(!env.is_active());
    }

    #[test]
    fn quieter_retrigger_keeps_current_slope() {
        let mut env = DecayEnvelope::new(0.1, 0.1, 0.2, 0.1);
        env.trigger(1.0);
        step(&mut env, 0.01, 15); // mid-decay, above 0.2
        let mid = env.value();
        assert!(mid > 0.2);

        // Re-trigger at a level below the current value: no restart
        env.trigger(mid - 0.1);
        env.update(0.01);
        assert!(env.value() <= mid, "decay should continue, not restart");
    }

    #[test]
    fn louder_retrigger_restarts_attack() {
        let mut env = DecayEnvelope::new(0.1, 0.1, 0.2, 0.1);
        env.trigger(0.5);
        step(&mut env, 0.01, 25);
        let settled = env.value();

        env.trigger(1.0);
        env.update(0.01);
        assert!(env.value() > settled, "louder trigger should ramp upward");
    }

    #[test]
    fn value_stays_bounded() {
        let mut env = DecayEnvelope::new(0.001, 0.001, 0.9, 0.001);
        env.trigger(1.0);
        for _ in 0..1000 {
            env.update(0.0103);
            assert!((0.0..=1.0).contains(&env.value()));
        }
        env.release();
        for _ in 0..1000 {
            env.update(0.0103);
            assert!((0.0..=1.0).contains(&env.value()));
        }
    }

    #[test]
    fn inactive_implies_min_value() {
        let mut env = DecayEnvelope::new(0.01, 0.01, 0.5, 0.01);
        env.set_curve(Curve::Linear);
        env.trigger(1.0);
        step(&mut env, 0.005, 10);
        env.release();
        step(&mut env, 0.005, 10);
        assert!(!env.is_active());
        assert_eq!(env.value(), 0.0);
    }
}
