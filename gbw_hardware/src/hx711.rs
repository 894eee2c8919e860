//! Bit-banged HX711 load-cell ADC.
use std::time::Duration;

use gbw_traits::{MonotonicClock, Scale};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::wait_until_low;

/// Extra clock pulses after the 24 data bits: 1 selects channel A, gain 128.
pub const GAIN_128_PULSES: u8 = 1;

pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    gain_pulses: u8,
}

impl Hx711 {
    pub fn new(dt: InputPin, mut sck: OutputPin, gain_pulses: u8) -> Self {
        // clock idle low keeps the chip powered up
        sck.set_low();
        Self {
            dt,
            sck,
            gain_pulses: gain_pulses.clamp(1, 3),
        }
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        let dt = &self.dt;
        wait_until_low(
            &MonotonicClock::new(),
            || dt.is_high(),
            timeout,
            Duration::from_micros(200),
        )?;

        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            spin_delay();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            spin_delay();
        }
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            spin_delay();
            self.sck.set_low();
            spin_delay();
        }

        // sign-extend 24-bit two's complement
        if (value & 0x80_0000) != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }
}

#[inline(always)]
fn spin_delay() {
    std::hint::spin_loop();
}

/// `Scale` over an HX711, retrying a couple of data-ready timeouts.
pub struct HardwareScale {
    hx711: Hx711,
    retries: u8,
}

impl HardwareScale {
    pub fn open(dt_pin: u8, sck_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(format!("hx711 dt pin {dt_pin}: {e}")))?
            .into_input();
        let sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(format!("hx711 sck pin {sck_pin}: {e}")))?
            .into_output_low();
        Ok(Self {
            hx711: Hx711::new(dt, sck, GAIN_128_PULSES),
            retries: 2,
        })
    }
}

impl Scale for HardwareScale {
    fn read(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let mut attempts = 0;
        loop {
            match self.hx711.read_with_timeout(timeout) {
                Ok(raw) => return Ok(raw),
                Err(HwError::DataReadyTimeout) if attempts < self.retries => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, "scale timeout, retrying");
                }
                Err(e) => return Err(Box::new(e)),
            }
        }
    }
}
