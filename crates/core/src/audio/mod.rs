use std::sync::{Arc, Mutex, MutexGuard};

use crate::{BandEnergies, ReactiveError, Result};

/// Last-value-wins cell for hosts that deliver audio frames on a different
/// OS thread than the one running the engine.
///
/// The audio side calls [`AudioHandoff::publish`]; the engine thread calls
/// [`AudioHandoff::take_latest`] once per tick. Frames published between two
/// takes are dropped, only the newest survives.
#[derive(Clone, Default)]
pub struct AudioHandoff {
    shared: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<BandEnergies>,
    published: u64,
    taken: u64,
}

impl AudioHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any frame that has not been taken yet.
    pub fn publish(&self, energies: BandEnergies) -> Result<()> {
        let mut slot = self.lock()?;
        slot.latest = Some(energies);
        slot.published += 1;
        Ok(())
    }

    /// Returns the newest frame published since the previous take.
    pub fn take_latest(&self) -> Result<Option<BandEnergies>> {
        let mut slot = self.lock()?;
        let latest = slot.latest.take();
        if latest.is_some() {
            slot.taken += 1;
        }
        Ok(latest)
    }

    /// Number of published frames that were overwritten before being taken.
    pub fn dropped(&self) -> Result<u64> {
        let slot = self.lock()?;
        let pending = u64::from(slot.latest.is_some());
        Ok(slot.published - slot.taken - pending)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot>> {
        self.shared
            .lock()
            .map_err(|_| ReactiveError::msg("audio handoff has been poisoned"))
    }
}

impl std::fmt::Debug for AudioHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioHandoff").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_frame() {
        let handoff = AudioHandoff::new();
        handoff.publish(BandEnergies::new(0.1, 0.0, 0.0, 0.0)).unwrap();
        handoff.publish(BandEnergies::new(0.2, 0.0, 0.0, 0.0)).unwrap();

        let latest = handoff.take_latest().unwrap().unwrap();
        assert_eq!(latest.bass, 0.2);
        assert!(handoff.take_latest().unwrap().is_none());
        assert_eq!(handoff.dropped().unwrap(), 1);
    }

    #[test]
    fn crosses_threads() {
        let handoff = AudioHandoff::new();
        let producer = handoff.clone();

        std::thread::spawn(move || {
            for i in 0..100 {
                producer
                    .publish(BandEnergies::new(i as f32, 0.0, 0.0, 0.0))
                    .expect("publishing should succeed");
            }
        })
        .join()
        .unwrap();

        let latest = handoff.take_latest().unwrap().unwrap();
        assert_eq!(latest.bass, 99.0);
    }
}
