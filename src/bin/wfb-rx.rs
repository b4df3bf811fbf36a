//! CLI entry point wiring a `RadioDevice` to the [`wfb_link::supervisor::Supervisor`].
//!
//! The USB driver for the RTL8812AU/EU itself is out of scope (spec §1); this
//! binary uses a placeholder [`NullRadioDevice`] that never yields a frame,
//! so the process demonstrates the full start/stop/telemetry lifecycle
//! without real hardware. Swap in a real `RadioDevice` implementation to go
//! from demo to production.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use wfb_link::config::Config;
use wfb_link::device::{DeviceId, Packet, RadioDevice};
use wfb_link::events::SdpWritingEventSink;
use wfb_link::supervisor::Supervisor;

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 802.11 channel number.
    #[arg(long, default_value = "161")]
    channel: u8,

    /// Channel width in MHz.
    #[arg(long, default_value = "20")]
    channel_width: u32,

    /// wfb link ID.
    #[arg(long, default_value = "55")]
    link_id: u32,

    /// Path to the 64-byte receiver/transmitter keypair file.
    #[arg(long)]
    keypair: PathBuf,

    /// UDP destination for decoded RTP.
    #[arg(long, default_value = "127.0.0.1")]
    rtp_dest: String,

    /// UDP port for decoded RTP.
    #[arg(long)]
    rtp_port: Option<u16>,

    /// Where to write the one-shot SDP announcement.
    #[arg(long)]
    sdp: Option<PathBuf>,

    /// Disable the adaptive-link uplink.
    #[arg(long)]
    no_alink: bool,

    /// Adaptive-link uplink endpoint.
    #[arg(long)]
    alink_addr: Option<String>,

    /// Initial TX power in mW, `[1, 40]`.
    #[arg(long, default_value = "25")]
    tx_power: u32,

    /// Load configuration from a JSON sidecar instead of flags.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Placeholder `RadioDevice`: enumerates nothing, and blocks for the full
/// timeout on every `recv` instead of producing frames. See module docs.
struct NullRadioDevice {
    interrupt: Box<dyn Fn() -> bool + Send>,
}

impl RadioDevice for NullRadioDevice {
    fn list_devices() -> Vec<DeviceId> {
        Vec::new()
    }

    fn open(_device: &DeviceId, _channel: u8, _channel_width: u32) -> wfb_link::Result<Self> {
        Ok(Self {
            interrupt: Box::new(|| false),
        })
    }

    fn recv(&mut self, timeout: Duration) -> Option<Packet> {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if (self.interrupt)() {
                return None;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    fn set_interrupt(&mut self, interrupt: Box<dyn Fn() -> bool + Send>) {
        self.interrupt = interrupt;
    }

    fn set_tx_power(&mut self, mw: u32) -> wfb_link::Result<()> {
        wfb_link::adaptive_link::validate_tx_power(mw)
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("wfb_link")
        .quiet(false)
        .verbosity(opt.verbose as usize + 1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let mut config = match &opt.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.channel = opt.channel;
    config.channel_width = opt.channel_width;
    config.link_id = opt.link_id;
    config.keypair_path = opt.keypair;
    config.rtp_dest = opt.rtp_dest;
    if let Some(port) = opt.rtp_port {
        config.rtp_port = port;
    }
    if opt.sdp.is_some() {
        config.sdp_path = opt.sdp;
    }
    config.alink_enabled = !opt.no_alink;
    if let Some(addr) = opt.alink_addr {
        config.alink_addr = addr;
    }
    config.initial_tx_power_mw = opt.tx_power;

    let device: Box<dyn RadioDevice> = Box::new(NullRadioDevice::open(
        &DeviceId {
            vendor_id: 0,
            product_id: 0,
            bus: 0,
            port: 0,
            display_name: "null".into(),
        },
        config.channel,
        config.channel_width,
    )?);

    let supervisor = Arc::new(Supervisor::new(Arc::new(SdpWritingEventSink::new(config.sdp_path.clone()))));
    supervisor.try_start(device, config)?;

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let handler_running = running.clone();
    ctrlc::set_handler(move || {
        log::info!("received Ctrl-C, shutting down");
        handler_running.store(false, std::sync::atomic::Ordering::SeqCst);
    })?;

    while running.load(std::sync::atomic::Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }
    supervisor.stop();
    Ok(())
}
