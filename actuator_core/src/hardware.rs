//! Driver-side state of one actuator: the capability driver plus the optional
//! external limit switches and encoder, the position reference and the limit
//! checks the command pipeline runs before writing.
use crate::error::Result;
use crate::hw_error::report;
use crate::util::clip_power;
use actuator_traits::{Actuator, Capability, Direction, DigitalInput, Encoder};
use std::sync::Arc;

/// Edge of the lower limit switch that resets the position reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    OnActive,
    OnInactive,
    OnBoth,
}

impl TriggerMode {
    fn matches(self, active: bool) -> bool {
        match self {
            TriggerMode::OnActive => active,
            TriggerMode::OnInactive => !active,
            TriggerMode::OnBoth => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSide {
    Lower,
    Upper,
}

pub type TriggerCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct LowerSwitchTrigger {
    mode: TriggerMode,
    last: bool,
    callback: Option<TriggerCallback>,
}

struct ExternalSwitch {
    input: Box<dyn DigitalInput>,
    enabled: bool,
}

pub(crate) struct Hardware {
    pub driver: Box<dyn Actuator>,
    lower_switch: Option<ExternalSwitch>,
    upper_switch: Option<ExternalSwitch>,
    encoder: Option<Box<dyn Encoder>>,
    pub swapped: bool,
    scale: f64,
    offset: f64,
    zero: f64,
    soft_lower: Option<f64>,
    soft_upper: Option<f64>,
    pub nominal_voltage: Option<f64>,
    trigger: Option<LowerSwitchTrigger>,
}

impl Hardware {
    pub fn new(driver: Box<dyn Actuator>) -> Self {
        Self {
            driver,
            lower_switch: None,
            upper_switch: None,
            encoder: None,
            swapped: false,
            scale: 1.0,
            offset: 0.0,
            zero: 0.0,
            soft_lower: None,
            soft_upper: None,
            nominal_voltage: None,
            trigger: None,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.driver.supports(capability)
    }

    // ── Position sensor ──────────────────────────────────────────────────────

    pub fn set_encoder(&mut self, encoder: Box<dyn Encoder>) {
        self.encoder = Some(encoder);
    }

    pub fn has_position_sensor(&self) -> bool {
        self.encoder.is_some() || self.supports(Capability::PositionSensor)
    }

    pub fn set_scale_and_offset(&mut self, scale: f64, offset: f64) {
        self.scale = scale;
        self.offset = offset;
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    fn raw_position(&mut self) -> Result<f64> {
        if let Some(enc) = &self.encoder {
            return Ok(enc.position());
        }
        self.driver.position().map_err(|e| report(e.as_ref()))
    }

    /// Scaled reading without the zero reference applied.
    fn scaled_position(&mut self) -> Result<f64> {
        Ok(self.raw_position()? * self.scale + self.offset)
    }

    pub fn position(&mut self) -> Result<f64> {
        Ok(self.scaled_position()? - self.zero)
    }

    /// `None` when no position sensor is wired.
    pub fn try_position(&mut self) -> Option<f64> {
        if !self.has_position_sensor() {
            return None;
        }
        self.position()
            .map_err(|e| tracing::debug!(error = %e, "position read failed"))
            .ok()
    }

    /// Convert a logical position into the driver's native units.
    pub fn to_raw_position(&self, position: f64) -> f64 {
        (position + self.zero - self.offset) / self.scale
    }

    /// Store the zero reference. A hardware reset zeroes the sensor first.
    pub fn reset_position(&mut self, hardware: bool) -> Result<()> {
        if hardware {
            if let Some(enc) = &mut self.encoder {
                enc.reset();
            } else if self.driver.supports(Capability::PositionSensor) {
                self.driver
                    .reset_position()
                    .map_err(|e| report(e.as_ref()))?;
            }
        }
        self.zero = if self.has_position_sensor() {
            self.scaled_position()?
        } else {
            0.0
        };
        tracing::debug!(hardware, zero = self.zero, "position reference reset");
        Ok(())
    }

    pub fn set_position_sensor_inverted(&mut self, inverted: bool) -> Result<()> {
        if let Some(enc) = &mut self.encoder {
            enc.set_inverted(inverted);
            return Ok(());
        }
        self.driver
            .set_position_sensor_inverted(inverted)
            .map_err(|e| report(e.as_ref()))
    }

    pub fn is_position_sensor_inverted(&mut self) -> Result<bool> {
        if let Some(enc) = &self.encoder {
            return Ok(enc.is_inverted());
        }
        self.driver
            .is_position_sensor_inverted()
            .map_err(|e| report(e.as_ref()))
    }

    pub fn velocity(&mut self) -> Result<f64> {
        let v = self.driver.velocity().map_err(|e| report(e.as_ref()))?;
        Ok(v * self.scale)
    }

    pub fn current(&mut self) -> Result<f64> {
        self.driver.current().map_err(|e| report(e.as_ref()))
    }

    // ── Limit switches ───────────────────────────────────────────────────────

    pub fn set_external_switch(&mut self, side: LimitSide, input: Box<dyn DigitalInput>) {
        let sw = Some(ExternalSwitch {
            input,
            enabled: true,
        });
        match side {
            LimitSide::Lower => self.lower_switch = sw,
            LimitSide::Upper => self.upper_switch = sw,
        }
    }

    fn external(&mut self, side: LimitSide) -> Option<&mut ExternalSwitch> {
        match side {
            LimitSide::Lower => self.lower_switch.as_mut(),
            LimitSide::Upper => self.upper_switch.as_mut(),
        }
    }

    /// Hardware direction the given side maps to.
    pub fn direction(&self, side: LimitSide) -> Direction {
        match (side, self.swapped) {
            (LimitSide::Lower, false) | (LimitSide::Upper, true) => Direction::Reverse,
            (LimitSide::Upper, false) | (LimitSide::Lower, true) => Direction::Forward,
        }
    }

    pub fn enable_switch(&mut self, side: LimitSide, normal_close: bool) -> Result<()> {
        if let Some(sw) = self.external(side) {
            sw.input.set_inverted(normal_close);
            sw.enabled = true;
            return Ok(());
        }
        let dir = self.direction(side);
        self.driver
            .enable_limit_switch(dir, normal_close)
            .map_err(|e| report(e.as_ref()))
    }

    pub fn disable_switch(&mut self, side: LimitSide) -> Result<()> {
        if let Some(sw) = self.external(side) {
            sw.enabled = false;
            return Ok(());
        }
        let dir = self.direction(side);
        self.driver
            .disable_limit_switch(dir)
            .map_err(|e| report(e.as_ref()))
    }

    pub fn is_switch_enabled(&mut self, side: LimitSide) -> Result<bool> {
        if let Some(sw) = self.external(side) {
            return Ok(sw.enabled);
        }
        let dir = self.direction(side);
        self.driver
            .is_limit_switch_enabled(dir)
            .map_err(|e| report(e.as_ref()))
    }

    pub fn set_switch_inverted(&mut self, side: LimitSide, inverted: bool) -> Result<()> {
        if let Some(sw) = self.external(side) {
            sw.input.set_inverted(inverted);
            return Ok(());
        }
        let dir = self.direction(side);
        self.driver
            .set_limit_switch_inverted(dir, inverted)
            .map_err(|e| report(e.as_ref()))
    }

    /// Active and enabled. A side without any switch reads inactive.
    pub fn is_switch_active(&mut self, side: LimitSide) -> bool {
        if let Some(sw) = self.external(side) {
            return sw.enabled && sw.input.is_active();
        }
        if !self.driver.supports(Capability::LimitSwitches) {
            return false;
        }
        let dir = self.direction(side);
        self.driver
            .is_limit_switch_active(dir)
            .map_err(|e| tracing::debug!(error = %e, "limit switch read failed"))
            .unwrap_or(false)
    }

    /// Zero `value` when it would drive further into an active external
    /// switch. Native switches are enforced by the driver itself.
    pub fn switch_veto(&mut self, value: f64) -> f64 {
        let blocked = (value < 0.0 && self.lower_switch.is_some() && self.is_switch_active(LimitSide::Lower))
            || (value > 0.0 && self.upper_switch.is_some() && self.is_switch_active(LimitSide::Upper));
        if blocked {
            tracing::warn!(value, "command vetoed by limit switch");
            0.0
        } else {
            value
        }
    }

    // ── Soft limits ──────────────────────────────────────────────────────────

    pub fn set_soft_limits(&mut self, lower: Option<f64>, upper: Option<f64>) -> Result<()> {
        if self.driver.supports(Capability::SoftLimits) {
            let raw_lower = lower.map(|p| self.to_raw_position(p));
            let raw_upper = upper.map(|p| self.to_raw_position(p));
            let (lo_dir, hi_dir) = (
                self.direction(LimitSide::Lower),
                self.direction(LimitSide::Upper),
            );
            self.driver
                .set_soft_limit(lo_dir, raw_lower)
                .map_err(|e| report(e.as_ref()))?;
            self.driver
                .set_soft_limit(hi_dir, raw_upper)
                .map_err(|e| report(e.as_ref()))?;
        }
        self.soft_lower = lower;
        self.soft_upper = upper;
        Ok(())
    }

    pub fn soft_limits(&self) -> (Option<f64>, Option<f64>) {
        (self.soft_lower, self.soft_upper)
    }

    /// Zero `value` when the actuator already sits beyond a soft limit in the
    /// direction it asks for. Without a position sensor nothing is vetoed.
    pub fn soft_limit_veto(&mut self, value: f64) -> f64 {
        if value == 0.0 || (self.soft_lower.is_none() && self.soft_upper.is_none()) {
            return value;
        }
        let Some(pos) = self.try_position() else {
            return value;
        };
        let blocked = (value < 0.0 && self.soft_lower.is_some_and(|lo| pos <= lo))
            || (value > 0.0 && self.soft_upper.is_some_and(|hi| pos >= hi));
        if blocked {
            tracing::warn!(value, position = pos, "command vetoed by soft limit");
            0.0
        } else {
            value
        }
    }

    /// Whether a move from `current` to `target` must be refused.
    pub fn position_veto(&mut self, target: f64, current: Option<f64>) -> bool {
        if let Some(current) = current {
            if target < current && self.is_switch_active(LimitSide::Lower) {
                return true;
            }
            if target > current && self.is_switch_active(LimitSide::Upper) {
                return true;
            }
        }
        self.soft_lower.is_some_and(|lo| target < lo) || self.soft_upper.is_some_and(|hi| target > hi)
    }

    // ── Voltage compensation ─────────────────────────────────────────────────

    /// Scale `power` by nominal over measured bus voltage. A no-op when
    /// compensation is off or the driver cannot report bus voltage.
    pub fn compensate(&mut self, power: f64) -> Result<f64> {
        let Some(nominal) = self.nominal_voltage else {
            return Ok(power);
        };
        if power == 0.0 || !self.driver.supports(Capability::BusVoltage) {
            return Ok(power);
        }
        let bus = self.driver.bus_voltage().map_err(|e| report(e.as_ref()))?;
        if bus <= 0.0 {
            return Ok(power);
        }
        Ok(clip_power(power * nominal / bus))
    }

    // ── Lower switch trigger ─────────────────────────────────────────────────

    pub fn set_trigger(&mut self, mode: TriggerMode, callback: Option<TriggerCallback>) {
        let last = self.is_switch_active(LimitSide::Lower);
        self.trigger = Some(LowerSwitchTrigger {
            mode,
            last,
            callback,
        });
    }

    pub fn clear_trigger(&mut self) {
        self.trigger = None;
    }

    /// Check the lower switch for an edge matching the trigger mode and
    /// reset the position reference on one. Returns the callback to invoke
    /// with the new switch state.
    pub fn poll_trigger(&mut self) -> Result<Option<(Option<TriggerCallback>, bool)>> {
        if self.trigger.is_none() {
            return Ok(None);
        }
        let active = self.is_switch_active(LimitSide::Lower);
        let Some(trigger) = self.trigger.as_mut() else {
            return Ok(None);
        };
        if active == trigger.last {
            return Ok(None);
        }
        trigger.last = active;
        if !trigger.mode.matches(active) {
            return Ok(None);
        }
        let callback = trigger.callback.clone();
        self.reset_position(false)?;
        Ok(Some((callback, active)))
    }
}
