//! Recovery erase of sector 0.
//!
//! If the recovery button is held at boot, the first sector (or AT45 page)
//! of the serial flash is erased, destroying the boot image so the boot ROM
//! falls back to its own recovery path. There is no timer at this stage, so
//! erase completion is polled with a fixed iteration budget after a settle
//! delay.

use core::time::Duration;

use crate::geometry::{DeviceDescriptor, Family};
use crate::{DataFlash, Gpio, Result, SpiBus};
#[cfg(feature = "recovery")]
use crate::sreg::{At25Status, At45Status, MicronFlagStatus, SpansionStatus};
#[cfg(feature = "recovery")]
use crate::{Command, Error};

/// Result of a bounded poll.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on poll number `polls`, counting from 1.
    Ready { polls: u32 },
    /// The condition never held in the whole budget.
    Exhausted,
}

/// Evaluate `ready` up to `max_iterations` times, stopping as soon as it returns true.
///
/// Errors from `ready` are returned immediately.
pub fn poll_until<F>(max_iterations: u32, mut ready: F) -> Result<PollOutcome>
where
    F: FnMut() -> Result<bool>,
{
    for polls in 1..=max_iterations {
        if ready()? {
            return Ok(PollOutcome::Ready { polls });
        }
    }
    Ok(PollOutcome::Exhausted)
}

/// Settle delay and poll budget of an erase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EraseTiming {
    /// Delay between issuing the erase and the first status poll.
    pub settle: Duration,
    /// Maximum number of status polls before giving up.
    pub max_polls: u32,
}

impl EraseTiming {
    /// Timing calibrated for each family's sector 0 erase.
    pub fn for_family(family: Family) -> Self {
        match family {
            Family::At26F | Family::At26Df | Family::At45 => EraseTiming {
                settle: Duration::from_millis(33),
                max_polls: 1000,
            },
            Family::S25Fl512S | Family::N25Q => EraseTiming {
                settle: Duration::from_millis(50),
                max_polls: 50000,
            },
        }
    }
}

/// Recovery button configuration.
#[derive(Copy, Clone, Debug)]
pub struct RecoveryConfig {
    /// GPIO pin of the recovery button.
    pub pin: u32,
    /// If true, the button pulls the pin low when pressed.
    pub active_low: bool,
    /// Overrides `EraseTiming::for_family()` when set.
    pub timing: Option<EraseTiming>,
}

impl RecoveryConfig {
    pub fn is_pressed<G: Gpio>(&self, gpio: &mut G) -> bool {
        gpio.read(self.pin) != self.active_low
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Sector 0 was erased.
    Recovered,
    /// Recovery is not built in, not configured, or the button is not pressed.
    Skipped,
}

/// Steps of the sector 0 erase.
///
/// Each state performs its step when visited and moves to the next.
#[cfg(feature = "recovery")]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EraseState {
    Unlock,
    EraseIssued,
    WaitDelay,
    PollReady { budget: u32 },
    Done,
    TimedOut { polls: u32 },
}

/// True if `status`, as returned by `DataFlash::read_status(family)`, reports the erase complete.
#[cfg(feature = "recovery")]
pub(crate) fn erase_ready(family: Family, status: u8) -> bool {
    match family {
        Family::At26F | Family::At26Df => !At25Status(status).get_busy(),
        Family::At45 => At45Status(status).get_ready(),
        Family::S25Fl512S => !SpansionStatus(status).get_busy(),
        Family::N25Q => MicronFlagStatus(status).get_ready(),
    }
}

impl<'a, B: SpiBus> DataFlash<'a, B> {
    /// Erase sector 0 if recovery is built in and the recovery button is pressed.
    #[cfg(feature = "recovery")]
    pub fn maybe_recover<G: Gpio>(
        &mut self,
        desc: &DeviceDescriptor,
        config: Option<&RecoveryConfig>,
        gpio: &mut G,
    ) -> Result<RecoveryOutcome> {
        let config = match config {
            Some(config) => config,
            None => return Ok(RecoveryOutcome::Skipped),
        };

        log::info!("Hold the recovery button (pin {}) to erase sector 0", config.pin);
        if !config.is_pressed(gpio) {
            return Ok(RecoveryOutcome::Skipped);
        }

        log::info!("Recovery button pressed, erasing {} sector 0", desc.family);
        let timing = config.timing.unwrap_or_else(|| EraseTiming::for_family(desc.family));
        match self.erase_sector0(desc.family, timing) {
            Ok(()) => {
                log::info!("Sector 0 erase done");
                Ok(RecoveryOutcome::Recovered)
            }
            Err(err) => {
                log::error!("Sector 0 erase failed");
                Err(err)
            }
        }
    }

    /// Recovery is not built in, so there is never anything to do.
    #[cfg(not(feature = "recovery"))]
    pub fn maybe_recover<G: Gpio>(
        &mut self,
        _desc: &DeviceDescriptor,
        _config: Option<&RecoveryConfig>,
        _gpio: &mut G,
    ) -> Result<RecoveryOutcome> {
        Ok(RecoveryOutcome::Skipped)
    }

    /// Erase sector 0 (page 0 on AT45) and wait for completion.
    #[cfg(feature = "recovery")]
    pub fn erase_sector0(&mut self, family: Family, timing: EraseTiming) -> Result<()> {
        let mut state = EraseState::Unlock;
        loop {
            log::trace!("Sector 0 erase state: {:?}", state);
            state = match state {
                EraseState::Unlock => {
                    if family.is_at25() {
                        self.at25_unprotect()?;
                    }
                    EraseState::EraseIssued
                }
                EraseState::EraseIssued => {
                    self.issue_sector0_erase(family)?;
                    EraseState::WaitDelay
                }
                EraseState::WaitDelay => {
                    self.sleep(timing.settle);
                    EraseState::PollReady { budget: timing.max_polls }
                }
                EraseState::PollReady { budget } => {
                    match poll_until(budget, || Ok(erase_ready(family, self.read_status(family)?)))? {
                        PollOutcome::Ready { polls } => {
                            log::debug!("Erase complete after {} polls", polls);
                            EraseState::Done
                        }
                        PollOutcome::Exhausted => EraseState::TimedOut { polls: budget },
                    }
                }
                EraseState::Done => return Ok(()),
                EraseState::TimedOut { polls } => {
                    log::error!("{} sector 0 erase timed out after {} polls", family, polls);
                    return Err(Error::EraseTimedOut { family, polls });
                }
            };
        }
    }

    /// Remove AT25/AT26 software sector protection.
    ///
    /// If the sector protection registers are locked, they are unlocked first.
    #[cfg(feature = "recovery")]
    pub fn at25_unprotect(&mut self) -> Result<()> {
        let status = At25Status(self.read_status_at25()?);
        if status.get_swp() == 0 {
            log::debug!("No AT25 sectors are protected");
            return Ok(());
        }

        if status.get_sprl() {
            log::debug!("AT25 sector protection registers locked, unlocking");
            self.write_status_at25(0)?;
        }

        // Global unprotect.
        self.write_status_at25(0)?;

        let status = At25Status(self.read_status_at25()?);
        if status.is_protected() {
            log::error!("Unprotect AT25 failed, status 0x{:02X}", status.0);
            return Err(Error::UnprotectFailed { status: status.0 });
        }
        Ok(())
    }

    #[cfg(feature = "recovery")]
    fn write_status_at25(&mut self, status: u8) -> Result<()> {
        self.write_enable()?;
        self.write(Command::WriteStatus, &[status])
    }

    #[cfg(feature = "recovery")]
    fn issue_sector0_erase(&mut self, family: Family) -> Result<()> {
        let result = match family {
            Family::At26F | Family::At26Df => {
                self.write_enable().and_then(|_| self.write(Command::Erase4K, &[0, 0, 0]))
            }
            Family::At45 => self.write(Command::PageEraseAT45, &[0, 0, 0]),
            Family::S25Fl512S | Family::N25Q => {
                self.write_enable().and_then(|_| self.write(Command::Erase64K, &[0, 0, 0]))
            }
        };
        if result.is_err() {
            log::error!("{} sector 0 erase command failed", family);
        }
        result
    }
}
