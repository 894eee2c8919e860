//! Raspberry Pi GPIO relay and encoder/trigger inputs.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;
use gbw_traits::{Controls, InputEvent, Relay};
use rppal::gpio::{Gpio, InputPin, OutputPin};

use crate::encoder::{ButtonEdge, QuadratureDecoder};
use crate::error::{HwError, Result};

fn gpio() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))
}

fn input_pullup(gpio: &Gpio, pin: u8, what: &str) -> Result<InputPin> {
    gpio.get(pin)
        .map(|p| p.into_input_pullup())
        .map_err(|e| HwError::Gpio(format!("{what} pin {pin}: {e}")))
}

/// Grinder relay on one output pin.
pub struct GpioRelay {
    pin: OutputPin,
    active_high: bool,
}

impl GpioRelay {
    /// Claim `pin` and drive it to the disengaged level straight away.
    pub fn open(pin: u8, active_high: bool) -> Result<Self> {
        let p = gpio()?
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("relay pin {pin}: {e}")))?;
        let pin = if active_high {
            p.into_output_low()
        } else {
            p.into_output_high()
        };
        Ok(Self { pin, active_high })
    }
}

impl Relay for GpioRelay {
    fn set(&mut self, engaged: bool) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if engaged == self.active_high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

impl Drop for GpioRelay {
    fn drop(&mut self) {
        let _ = self.set(false);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControlPins {
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub encoder_button: u8,
    pub trigger: Option<u8>,
}

/// Encoder and trigger button. A poller thread samples the encoder pins at
/// 1 kHz and queues decoded events; the trigger is read on demand.
pub struct GpioControls {
    events: xch::Receiver<InputEvent>,
    trigger: Option<InputPin>,
    shutdown: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

impl GpioControls {
    pub fn open(pins: ControlPins) -> Result<Self> {
        let gpio = gpio()?;
        let a = input_pullup(&gpio, pins.encoder_a, "encoder A")?;
        let b = input_pullup(&gpio, pins.encoder_b, "encoder B")?;
        let button = input_pullup(&gpio, pins.encoder_button, "encoder button")?;
        let trigger = pins
            .trigger
            .map(|p| input_pullup(&gpio, p, "trigger"))
            .transpose()?;

        let (tx, events) = xch::bounded(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let poller = std::thread::Builder::new()
            .name("encoder".into())
            .spawn(move || {
                let mut quad = QuadratureDecoder::new(a.is_high(), b.is_high());
                let mut edge = ButtonEdge::default();
                while !stop.load(Ordering::Relaxed) {
                    if let Some(d) = quad.update(a.is_high(), b.is_high()) {
                        let _ = tx.try_send(InputEvent::Rotate(d));
                    }
                    if let Some(ev) = edge.update(button.is_high()) {
                        let _ = tx.try_send(ev);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            })?;
        Ok(Self {
            events,
            trigger,
            shutdown,
            poller: Some(poller),
        })
    }
}

impl Controls for GpioControls {
    fn poll_event(&mut self) -> Option<InputEvent> {
        self.events.try_recv().ok()
    }

    fn trigger_pressed(&mut self) -> bool {
        self.trigger.as_ref().is_some_and(InputPin::is_low)
    }
}

impl Drop for GpioControls {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.poller.take() {
            let _ = h.join();
        }
    }
}
