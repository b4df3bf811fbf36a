//! Link supervisor (spec §4.G): device lifecycle, thread composition,
//! start/stop. The crate's top-level entry point.
//!
//! Threading follows §5: the RX thread is driver-owned and must not block
//! indefinitely, so `stop` installs a cancellation flag the driver polls via
//! `RadioDevice::set_interrupt` and joins the thread afterwards, the same
//! cooperative shape `AdaptiveLink` uses.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info};

use crate::adaptive_link::{self, AdaptiveLink};
use crate::channel::{ChannelId, RadioPort};
use crate::config::Config;
use crate::device::{DeviceId, RadioDevice};
use crate::engine::{self, ChannelEngine};
use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::rtp::RtpSink;
use crate::session::SessionLayer;
use crate::session::KeyMaterial;
use crate::signal_quality::SignalQualityCalculator;

const RX_POLL_TIMEOUT: Duration = Duration::from_millis(200);

struct Running {
    cancel: Arc<AtomicBool>,
    rx_thread: JoinHandle<()>,
    alink: Option<AdaptiveLink>,
}

/// Owns device lifecycle and thread composition for one link (spec §4.G).
pub struct Supervisor {
    events: Arc<dyn EventSink>,
    quality: Arc<SignalQualityCalculator>,
    running: Mutex<Option<Running>>,
    /// Frames the classifier rejected as not matching the wfb template
    /// (spec §4.A: "non-wfb frames are dropped silently, counter
    /// incremented").
    non_wfb_frames: Arc<AtomicU64>,
}

impl Supervisor {
    /// Build a supervisor reporting events/tips through `events`.
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            quality: Arc::new(SignalQualityCalculator::new()),
            running: Mutex::new(None),
            non_wfb_frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enumerate devices a concrete `RadioDevice` implementation exposes
    /// (spec §4.G). Generic because `RadioDevice::list_devices` is an
    /// associated function, not an object-safe method.
    pub fn list_devices<D: RadioDevice>() -> Vec<DeviceId> {
        D::list_devices()
    }

    /// Claim `device` (already opened by the caller on the desired
    /// channel/width) and start the RX + adaptive-link threads. Returns
    /// `false` on failure, matching the source interface's boolean
    /// `start`; see [`Self::try_start`] for the `Result`-returning form
    /// library callers should prefer.
    pub fn start(&self, device: Box<dyn RadioDevice>, config: Config) -> bool {
        self.try_start(device, config).is_ok()
    }

    /// `start`, surfacing the failure reason instead of collapsing it to
    /// `bool` (spec §7: only supervisor-level errors propagate).
    pub fn try_start(&self, mut device: Box<dyn RadioDevice>, config: Config) -> Result<()> {
        let mut running = self.running.lock().unwrap();
        if running.is_some() {
            return Err(Error::DeviceOpenFailed("already running".into()));
        }

        let keys = KeyMaterial::from_file(&config.keypair_path)?;
        let channel_id = ChannelId::new(config.link_id, RadioPort::Video);
        let session = SessionLayer::new(channel_id, keys);
        let rtp_addr = format!("{}:{}", config.rtp_dest, config.rtp_port);
        let rtp = RtpSink::connect(&rtp_addr, config.rtp_port)?;
        let mut engine = ChannelEngine::new(
            channel_id,
            session,
            rtp,
            self.quality.clone(),
            self.events.clone(),
        );

        device.set_tx_power(config.initial_tx_power_mw)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let interrupt_cancel = cancel.clone();
        device.set_interrupt(Box::new(move || interrupt_cancel.load(Ordering::SeqCst)));

        let rx_cancel = cancel.clone();
        let non_wfb_frames = self.non_wfb_frames.clone();
        let rx_thread = std::thread::Builder::new()
            .name("wfb-rx".into())
            .spawn(move || {
                while !rx_cancel.load(Ordering::SeqCst) {
                    let Some(packet) = device.recv(RX_POLL_TIMEOUT) else {
                        continue;
                    };
                    if let Err(e) = engine::dispatch(&packet.bytes, &packet.rx_attributes, std::slice::from_mut(&mut engine)) {
                        non_wfb_frames.fetch_add(1, Ordering::Relaxed);
                        log::debug!("frame dropped: {e}");
                    }
                }
            })
            .map_err(|e| Error::DeviceOpenFailed(format!("spawning RX thread: {e}")))?;

        let alink = if config.alink_enabled {
            let now = || chrono::Utc::now().timestamp().max(0) as u64;
            Some(AdaptiveLink::spawn(self.quality.clone(), config.alink_addr.clone(), now)?)
        } else {
            None
        };

        *running = Some(Running {
            cancel,
            rx_thread,
            alink,
        });
        info!("supervisor started on channel {channel_id}");
        Ok(())
    }

    /// Signal both threads to exit and join them. Safe to call at any
    /// point, including when nothing is running.
    pub fn stop(&self) {
        let running = self.running.lock().unwrap().take();
        let Some(running) = running else { return };
        running.cancel.store(true, Ordering::SeqCst);
        if let Err(e) = running.rx_thread.join() {
            error!("RX thread panicked: {e:?}");
        }
        if let Some(alink) = running.alink {
            alink.stop();
        }
        info!("supervisor stopped");
    }

    /// Enable or disable the adaptive-link uplink. A no-op if nothing is
    /// running; callers that want this to take effect mid-session should
    /// restart with the desired `Config::alink_enabled`.
    pub fn enable_alink(&self, enabled: bool, config: &Config) {
        let mut running = self.running.lock().unwrap();
        let Some(running) = running.as_mut() else {
            return;
        };
        match (enabled, &mut running.alink) {
            (true, None) => {
                let quality = self.quality.clone();
                let addr = config.alink_addr.clone();
                let now = || chrono::Utc::now().timestamp().max(0) as u64;
                match AdaptiveLink::spawn(quality, addr, now) {
                    Ok(a) => running.alink = Some(a),
                    Err(e) => error!("failed to start adaptive link: {e}"),
                }
            }
            (false, Some(_)) => {
                if let Some(a) = running.alink.take() {
                    a.stop();
                }
            }
            _ => {}
        }
    }

    /// Change TX power mid-session (spec §4.E). Requires a running device;
    /// callers without direct device access route this through their own
    /// `RadioDevice` handle.
    pub fn set_alink_tx_power(&self, device: &mut dyn RadioDevice, mw: u32) -> Result<()> {
        adaptive_link::set_tx_power(device, mw)
    }

    /// Latest per-antenna composite link score (spec §4.G).
    pub fn get_link_score(&self) -> [f32; 2] {
        self.quality.calculate().link_score
    }

    /// Fragments lost in the last second, across all in-flight blocks
    /// (spec §4.G's `get_packet_loss`).
    pub fn get_packet_loss(&self) -> u32 {
        self.quality.calculate().lost_last_s
    }

    /// Frames rejected by the classifier as not matching the wfb template
    /// (spec §4.A), accumulated over the supervisor's lifetime.
    pub fn non_wfb_frame_count(&self) -> u64 {
        self.non_wfb_frames.load(Ordering::Relaxed)
    }
}
