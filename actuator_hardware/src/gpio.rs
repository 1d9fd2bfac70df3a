//! GPIO limit switch on a Raspberry Pi input pin.
use crate::error::{HwError, Result};
use actuator_traits::DigitalInput;
use rppal::gpio::{Gpio, InputPin};

pub struct GpioLimitSwitch {
    pin: InputPin,
    inverted: bool,
}

impl GpioLimitSwitch {
    /// Open `bcm_pin` as an input with the internal pull-up; a closed switch
    /// pulls the line low.
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();
        tracing::debug!(bcm_pin, "limit switch input opened");
        Ok(Self {
            pin,
            inverted: false,
        })
    }
}

impl DigitalInput for GpioLimitSwitch {
    fn is_active(&self) -> bool {
        self.pin.is_low() != self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }
}
