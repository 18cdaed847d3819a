//! Debounced last-command persistence.
//!
//! The last applied JSON payload per channel is written to NVS so a
//! power-cycled node comes back in its previous state. Writes are
//! debounced: the first change on a channel arms a flush deadline and
//! later changes inside the window only replace the payload, so a
//! command burst costs one flash write and a dirty record is never held
//! longer than the window. At boot the stored payloads are replayed
//! through reconciliation in place of live commands.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::{RELAY_MAX_CHANNELS, RGB_MAX_STRIPS, WHITE_MAX_CHANNELS, WS_MAX_STRIPS};
use crate::ports::{StorageError, StoragePort};
use crate::reconcile::Family;

const NAMESPACE: &str = "ul_state";
const MAX_PAYLOAD: usize = 512;

const SLOTS: usize = WS_MAX_STRIPS + RGB_MAX_STRIPS + WHITE_MAX_CHANNELS + RELAY_MAX_CHANNELS;

fn family_channels(family: Family) -> usize {
    match family {
        Family::Ws => WS_MAX_STRIPS,
        Family::Rgb => RGB_MAX_STRIPS,
        Family::White => WHITE_MAX_CHANNELS,
        Family::Relay => RELAY_MAX_CHANNELS,
    }
}

fn slot(family: Family, channel: usize) -> Option<usize> {
    if channel >= family_channels(family) {
        return None;
    }
    let base = match family {
        Family::Ws => 0,
        Family::Rgb => WS_MAX_STRIPS,
        Family::White => WS_MAX_STRIPS + RGB_MAX_STRIPS,
        Family::Relay => WS_MAX_STRIPS + RGB_MAX_STRIPS + WHITE_MAX_CHANNELS,
    };
    Some(base + channel)
}

fn key(family: Family, channel: usize) -> heapless::String<12> {
    let mut k = heapless::String::new();
    let _ = core::fmt::write(&mut k, format_args!("{}_{}", family.as_str(), channel));
    k
}

struct Pending {
    payload: String,
    deadline: Instant,
}

pub struct StateStore {
    flush_delay: Duration,
    pending: [Option<Pending>; SLOTS],
}

impl StateStore {
    pub fn new(flush_delay_ms: u32) -> Self {
        Self {
            flush_delay: Duration::from_millis(u64::from(flush_delay_ms)),
            pending: core::array::from_fn(|_| None),
        }
    }

    /// Record the last payload for a channel. Arms the flush deadline on
    /// the first change; later changes in the window keep the deadline.
    pub fn record(&mut self, family: Family, channel: usize, payload: &str) {
        let Some(i) = slot(family, channel) else {
            return;
        };
        if payload.len() > MAX_PAYLOAD {
            warn!("state: payload for {}_{} too large, not persisted", family.as_str(), channel);
            return;
        }
        match &mut self.pending[i] {
            Some(p) => p.payload = payload.to_owned(),
            None => {
                self.pending[i] = Some(Pending {
                    payload: payload.to_owned(),
                    deadline: Instant::now() + self.flush_delay,
                });
            }
        }
    }

    /// Flush records whose deadline passed. Call from the supervisory
    /// loop. Returns the number of records written.
    pub fn tick(&mut self, storage: &mut dyn StoragePort) -> usize {
        let now = Instant::now();
        let mut written = 0;
        for (i, entry) in self.pending.iter_mut().enumerate() {
            let due = entry.as_ref().is_some_and(|p| p.deadline <= now);
            if !due {
                continue;
            }
            if let Some(p) = entry.take() {
                if let Some((family, channel)) = unslot(i) {
                    match storage.write(NAMESPACE, key(family, channel).as_str(), p.payload.as_bytes()) {
                        Ok(()) => written += 1,
                        Err(e) => warn!("state: flush of {}_{} failed: {}", family.as_str(), channel, e),
                    }
                }
            }
        }
        written
    }

    /// Flush everything regardless of deadline. For shutdown paths.
    pub fn flush_all(&mut self, storage: &mut dyn StoragePort) -> usize {
        let now = Instant::now();
        for entry in self.pending.iter_mut().flatten() {
            entry.deadline = now;
        }
        self.tick(storage)
    }

    pub fn dirty_count(&self) -> usize {
        self.pending.iter().flatten().count()
    }
}

fn unslot(i: usize) -> Option<(Family, usize)> {
    for family in [Family::Ws, Family::Rgb, Family::White, Family::Relay] {
        for ch in 0..family_channels(family) {
            if slot(family, ch) == Some(i) {
                return Some((family, ch));
            }
        }
    }
    None
}

/// Replay every stored payload through `apply` in channel order.
pub fn replay(storage: &dyn StoragePort, mut apply: impl FnMut(Family, usize, &str)) {
    let mut buf = [0u8; MAX_PAYLOAD];
    let mut replayed = 0;
    for family in [Family::Ws, Family::Rgb, Family::White, Family::Relay] {
        for ch in 0..family_channels(family) {
            let k = key(family, ch);
            match storage.read(NAMESPACE, k.as_str(), &mut buf) {
                Ok(n) => {
                    if let Ok(payload) = core::str::from_utf8(&buf[..n]) {
                        apply(family, ch, payload);
                        replayed += 1;
                    } else {
                        warn!("state: stored payload for {} is not UTF-8, skipped", k);
                    }
                }
                Err(StorageError::NotFound) => {}
                Err(e) => warn!("state: read of {} failed: {}", k, e),
            }
        }
    }
    info!("state: replayed {} channel records", replayed);
}
