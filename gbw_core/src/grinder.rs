//! Grinder actuator on top of a `Relay`.
//!
//! Two wiring styles exist: grinders with a momentary "start/stop" input want a
//! short pulse per toggle (impulse mode), others are switched on and off by
//! holding the relay (continuous mode). Scale-only mode never touches the relay.
use crate::config::GrinderCfg;
use crate::error::Result;
use crate::hw_error::map_boxed;
use eyre::WrapErr;
use gbw_traits::Relay;
use gbw_traits::clock::Clock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrindMode {
    Impulse,
    Continuous,
}

impl GrindMode {
    /// Persisted as `grindMode` (true = continuous).
    pub fn from_continuous(continuous: bool) -> Self {
        if continuous {
            GrindMode::Continuous
        } else {
            GrindMode::Impulse
        }
    }
}

pub struct Grinder<R: Relay, C: Clock> {
    relay: R,
    clock: C,
    cfg: GrinderCfg,
    mode: GrindMode,
    scale_only: bool,
    running: bool,
    level: bool,
}

impl<R: Relay, C: Clock> Grinder<R, C> {
    pub fn new(relay: R, clock: C, cfg: GrinderCfg, mode: GrindMode, scale_only: bool) -> Self {
        Self {
            relay,
            clock,
            cfg,
            mode,
            scale_only,
            running: false,
            level: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> GrindMode {
        self.mode
    }

    pub fn scale_only(&self) -> bool {
        self.scale_only
    }

    /// Change wiring style. Only honoured while stopped so a running grinder
    /// is never left in an unknown state.
    pub fn set_mode(&mut self, mode: GrindMode) {
        if self.running {
            tracing::warn!(?mode, "grind mode change ignored while running");
            return;
        }
        self.mode = mode;
    }

    pub fn set_scale_only(&mut self, scale_only: bool) {
        if self.running {
            tracing::warn!(scale_only, "scale mode change ignored while running");
            return;
        }
        self.scale_only = scale_only;
    }

    /// Flip the grinder once: a pulse in impulse mode, a level change in
    /// continuous mode. No-op in scale-only mode.
    pub fn toggle(&mut self) -> Result<()> {
        if self.scale_only {
            return Ok(());
        }
        match self.mode {
            GrindMode::Impulse => {
                self.write(true)?;
                self.clock.sleep(Duration::from_millis(self.cfg.pulse_ms));
                self.write(false)?;
            }
            GrindMode::Continuous => {
                let next = !self.level;
                self.write(next)?;
            }
        }
        Ok(())
    }

    /// Start grinding if not already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.toggle().wrap_err("grinder start")?;
        self.running = true;
        tracing::debug!(mode = ?self.mode, scale_only = self.scale_only, "grinder started");
        Ok(())
    }

    /// Stop grinding if running. In continuous mode the relay is released even
    /// if the logical state was lost.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            if self.mode == GrindMode::Continuous && self.level && !self.scale_only {
                self.write(false).wrap_err("grinder release")?;
            }
            return Ok(());
        }
        self.running = false;
        match self.mode {
            GrindMode::Continuous if !self.scale_only => {
                self.write(false).wrap_err("grinder stop")?;
            }
            _ => self.toggle().wrap_err("grinder stop")?,
        }
        tracing::debug!("grinder stopped");
        Ok(())
    }

    fn write(&mut self, engaged: bool) -> Result<()> {
        self.relay
            .set(engaged)
            .map_err(|e| eyre::Report::new(map_boxed(e.as_ref())))?;
        self.level = engaged;
        Ok(())
    }
}
