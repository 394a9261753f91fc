//! Countdown/rollover clock driven by an external master clock.

/// Raw frequency values are 11-bit, mapped to a period of `2048 - freq`
/// master clock ticks. Legacy fixed-point synthesis convention.
const RAW_FREQUENCY_RANGE: f32 = 2048.0;

/// A countdown timer clocked by an external tick source.
///
/// `clock(ticks)` consumes master-clock ticks and reports `true` exactly
/// once per period exhaustion. Callers act on the `true` return where the
/// source design would override a rollover hook.
#[derive(Clone, Debug)]
pub struct UnitTimer {
    /// Rollover period in master clock ticks.
    period: f32,
    /// Ticks remaining until the next rollover.
    counter: f32,
    /// Divides the reload value: reload = period / period_multiplier.
    period_multiplier: f32,
    /// Ticks consumed since the last enable.
    cycles_since_last_clock: u64,
    enabled: bool,
}

impl UnitTimer {
    /// Create a timer with the given period (in master clock ticks).
    pub fn new(period: f32) -> Self {
        Self {
            period,
            counter: period,
            period_multiplier: 1.0,
            cycles_since_last_clock: 0,
            enabled: true,
        }
    }

    /// Consume `ticks` master-clock ticks.
    ///
    /// Returns `true` when the period is exhausted; the counter reloads to
    /// `period / period_multiplier` before returning. Disabled timers
    /// consume nothing and return `false`.
    pub fn clock(&mut self, ticks: u32) -> bool {
        if !self.enabled {
            return false;
        }
        self.cycles_since_last_clock += ticks as u64;
        self.counter -= ticks as f32;
        if self.counter <= 0.0 {
            self.reload();
            return true;
        }
        false
    }

    /// Reset the counter to the reload value.
    fn reload(&mut self) {
        self.counter = self.period / self.period_multiplier;
    }

    /// Resume clocking. Resets the tick accumulator so the next external
    /// tick restarts cleanly.
    pub fn enable(&mut self) {
        self.cycles_since_last_clock = 0;
        self.enabled = true;
    }

    /// Freeze the counter. Subsequent `clock` calls are no-ops.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set the rollover period in master clock ticks.
    pub fn set_period(&mut self, period: f32) {
        self.period = period;
        self.reload();
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    /// Set the period via the legacy 11-bit frequency encoding
    /// (`period = 2048 - freq`).
    pub fn set_frequency_raw(&mut self, freq: u16) {
        let freq = (freq & 0x07FF) as f32;
        self.set_period(RAW_FREQUENCY_RANGE - freq);
    }

    /// 11-bit frequency split across two bytes: 8 low bits plus the low
    /// 3 bits of `high`.
    pub fn set_frequency_bytes(&mut self, low: u8, high: u8) {
        let freq = ((high as u16 & 0x07) << 8) | low as u16;
        self.set_frequency_raw(freq);
    }

    /// Multiplier applied to the reload value (reload = period / multiplier).
    pub fn set_period_multiplier(&mut self, multiplier: f32) {
        if multiplier > 0.0 {
            self.period_multiplier = multiplier;
        }
    }

    /// Ticks remaining until the next rollover.
    pub fn counter(&self) -> f32 {
        self.counter
    }

    /// Ticks consumed since the last `enable`.
    pub fn cycles_since_last_clock(&self) -> u64 {
        self.cycles_since_last_clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolls_over_once_per_period() {
        let mut timer = UnitTimer::new(4.0);
        assert!(!timer.clock(1));
        assert!(!timer.clock(1));
        assert!(!timer.clock(1));
        assert!(timer.clock(1));
        // Counter reloaded; next rollover takes a full period again
        assert!(!timer.clock(3));
        assert!(timer.clock(1));
    }

    #[test]
    fn counter_decreases_by_clocked_amount() {
        let mut timer = UnitTimer::new(10.0);
        timer.clock(3);
        assert_eq!(timer.counter(), 7.0);
        timer.clock(2);
        assert_eq!(timer.counter(), 5.0);
    }

    #[test]
    fn disabled_timer_is_frozen() {
        let mut timer = UnitTimer::new(2.0);
        timer.disable();
        assert!(!timer.clock(100));
        assert_eq!(timer.counter(), 2.0);
    }

    #[test]
    fn enable_resets_cycle_accumulator() {
        let mut timer = UnitTimer::new(10.0);
        timer.clock(4);
        assert_eq!(timer.cycles_since_last_clock(), 4);
        timer.disable();
        timer.enable();
        assert_eq!(timer.cycles_since_last_clock(), 0);
    }

    #[test]
    fn large_tick_rolls_over() {
        let mut timer = UnitTimer::new(4.0);
        assert!(timer.clock(9));
        assert_eq!(timer.counter(), 4.0);
    }

    #[test]
    fn raw_frequency_maps_to_period() {
        let mut timer = UnitTimer::new(1.0);
        timer.set_frequency_raw(2047);
        assert_eq!(timer.period(), 1.0);
        timer.set_frequency_raw(0);
        assert_eq!(timer.period(), 2048.0);
    }

    #[test]
    fn frequency_bytes_combine_to_11_bits() {
        let mut timer = UnitTimer::new(1.0);
        timer.set_frequency_bytes(0xFF, 0x07);
        assert_eq!(timer.period(), 1.0); // freq 2047
        timer.set_frequency_bytes(0x00, 0x04);
        assert_eq!(timer.period(), 2048.0 - 1024.0);
    }

    #[test]
    fn period_multiplier_divides_reload() {
        let mut timer = UnitTimer::new(8.0);
        timer.set_period_multiplier(2.0);
        assert!(timer.clock(8));
        assert_eq!(timer.counter(), 4.0);
    }

    #[test]
    fn zero_multiplier_rejected() {
        let mut timer = UnitTimer::new(8.0);
        timer.set_period_multiplier(0.0);
        assert!(timer.clock(8));
        assert_eq!(timer.counter(), 8.0);
    }
}
