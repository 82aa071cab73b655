//! Virtual radar simulation
//!
//! Provides a simulated radar that produces protocol-accurate hub frames:
//! a tag table, the control list, scope samples, health reports and
//! reflectivity rays sweeping in azimuth. It answers control commands the
//! way the demo reporter does.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::time::Duration;

use hub_protocol::frame::{
    ControlFrame, ControlItem, DefinitionFrame, HealthFrame, RayFrame, ScopeFrame,
};
use hub_protocol::ray::{azimuth_to_raw, elevation_to_raw, RayHeader, RAY_COUNTER_MODULUS};
use hub_protocol::{Command, EncodeFrame, Product, Response, TagTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Chirp rate factor of the "Go" waveform
const RATE_GO: f32 = 1.0;
/// Chirp rate factor of "Try Me 1"
const RATE_TRY_1: f32 = -2.5;
/// Chirp rate factor of "Try Me 2"
const RATE_TRY_2: f32 = 5.0;

/// Fraction of the scope window tapered at each end
const TUKEY_ALPHA: f32 = 0.1;

/// Configuration for creating a virtual radar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualRadarConfig {
    /// Pathway announced in the control frame
    pub pathway: String,
    /// Scope frames per second
    pub frame_rate_hz: f32,
    /// Time between health reports (ms)
    pub health_interval_ms: u64,
    /// Rays sent with every scope frame
    pub rays_per_frame: usize,
    /// I/Q samples per scope channel
    pub scope_samples: usize,
    /// Peak of the chirp in ADC units
    pub amplitude: f32,
    /// Noise magnitude in ADC units
    pub noise: i16,
    /// Samples per ray
    pub gates: u16,
    /// Gate spacing (m)
    pub range_delta_m: u16,
    /// Elevation of the simulated sweep (degrees)
    pub elevation: f32,
    /// Fixed seed for reproducible noise
    pub seed: Option<u64>,
}

impl Default for VirtualRadarConfig {
    fn default() -> Self {
        Self {
            pathway: "demo".to_string(),
            frame_rate_hz: 15.0,
            health_interval_ms: 500,
            rays_per_frame: 6,
            scope_samples: 1000,
            amplitude: 25_000.0,
            noise: 1000,
            gates: 250,
            range_delta_m: 60,
            elevation: 4.0,
            seed: None,
        }
    }
}

/// Control list of the demo pathway
pub fn demo_controls() -> Vec<ControlItem> {
    vec![
        ControlItem::new("Go", "t y"),
        ControlItem::new("Stop", "t z"),
        ControlItem::new("Try Me 1", "t w 1"),
        ControlItem::new("Try Me 2", "t w 2"),
        ControlItem::new("PRF 1,000 Hz (84 km)", "t prf 1000"),
        ControlItem::new("PRF 2,000 Hz (65 km)", "t prf 2000"),
        ControlItem::new("Stop Pedestal", "p stop"),
        ControlItem::new("Park", "p point 0 90"),
        ControlItem::new("Measure Noise", "t n"),
        ControlItem::new("Transmit Toggle", "t tx"),
    ]
}

/// Symmetric Tukey window of `n` points, `alpha` of them tapered
pub fn tukey_window(n: usize, alpha: f32) -> Vec<f32> {
    let taper = ((alpha * n as f32) as usize).min(n / 2);
    let mut w = vec![1.0; n];
    for k in 0..taper {
        let v = 0.5 - 0.5 * (k as f32 / taper as f32 * PI).cos();
        w[k] = v;
        w[n - 1 - k] = v;
    }
    w
}

/// A simulated radar that queues protocol-encoded hub frames
#[derive(Debug)]
pub struct VirtualRadar {
    config: VirtualRadarConfig,
    table: TagTable,
    rng: StdRng,
    window: Vec<f32>,
    /// Transmitting a chirp (otherwise the scope shows noise only)
    go: bool,
    rate: f32,
    /// Greeted by a client; frames flow only after that
    streaming: bool,
    frame: u64,
    azimuth: f32,
    ray_counter: u8,
    sweep_counter: u8,
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualRadar {
    pub fn new(config: VirtualRadarConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let window = tukey_window(config.scope_samples, TUKEY_ALPHA)
            .into_iter()
            .map(|w| w * config.amplitude)
            .collect();
        Self {
            config,
            table: TagTable::default(),
            rng,
            window,
            go: true,
            rate: RATE_GO,
            streaming: false,
            frame: 0,
            azimuth: 0.0,
            ray_counter: 0,
            sweep_counter: 0,
            pending_output: VecDeque::new(),
        }
    }

    pub fn pathway(&self) -> &str {
        &self.config.pathway
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_transmitting(&self) -> bool {
        self.go
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Azimuth of the next ray (degrees)
    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    /// Time between scope frames
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.config.frame_rate_hz.max(0.1))
    }

    /// Scope frames between health reports
    fn health_every(&self) -> u64 {
        let per_frame = 1000.0 / self.config.frame_rate_hz.max(0.1);
        ((self.config.health_interval_ms as f32 / per_frame) as u64).max(1)
    }

    /// Queue what a hub sends when a socket opens: the tag table and the
    /// control list
    pub fn open(&mut self) {
        self.queue(&DefinitionFrame(self.table.clone()));
        let control = ControlFrame {
            pathway: self.config.pathway.clone(),
            control: demo_controls(),
        };
        self.queue(&control);
    }

    /// Handle a JSON command envelope from the client
    ///
    /// The greeting starts the stream; control messages are answered with a
    /// queued `Response` frame, which is also returned.
    pub fn handle_text(&mut self, text: &str) -> Option<Response> {
        match Command::from_json(text) {
            Ok(Command::UserGreet { pathway }) => {
                info!("Virtual radar {} greeted for {}", self.config.pathway, pathway);
                self.streaming = true;
                None
            }
            Ok(Command::UserMessage { payload, .. }) => {
                let response = self.respond(&payload);
                debug!("Virtual radar {} -> {}", payload, response.to_wire());
                self.queue(&response);
                Some(response)
            }
            Err(e) => {
                warn!("Virtual radar ignoring {:?}: {}", text, e);
                None
            }
        }
    }

    /// Apply a control payload and build the reply
    pub fn respond(&mut self, payload: &str) -> Response {
        match payload {
            "t y" => {
                self.go = true;
                self.rate = RATE_GO;
            }
            "t z" => self.go = false,
            "t w 1" => {
                self.go = true;
                self.rate = RATE_TRY_1;
            }
            "t w 2" => {
                self.go = true;
                self.rate = RATE_TRY_2;
            }
            _ => return Response::nak(format!("NAK {payload}")),
        }
        Response::ack(format!("ACK {payload}"))
    }

    /// Advance one frame period: a scope frame, a health report when due,
    /// and the next rays of the sweep
    pub fn step(&mut self) {
        self.frame += 1;
        let scope = self.scope();
        self.queue(&scope);
        if self.frame % self.health_every() == 0 {
            let health = self.health();
            self.queue(&health);
        }
        for _ in 0..self.config.rays_per_frame {
            let ray = self.ray();
            self.queue(&ray);
        }
    }

    fn scope(&mut self) -> ScopeFrame {
        let n = self.config.scope_samples;
        let j = self.frame as f32;
        let noise = self.config.noise.max(1);
        let mut ch1 = Vec::with_capacity(n);
        let mut ch2 = Vec::with_capacity(n);
        for (k, &w) in self.window.iter().enumerate() {
            let t = k as f32 / n as f32;
            let omega = 0.1 * (t + self.rate * 777.0 * t * t - j);
            let (i, q) = if self.go {
                (w * omega.cos(), w * omega.sin())
            } else {
                (0.0, 0.0)
            };
            let mut sample = |v: f32| {
                let jitter = self.rng.random_range(-noise..noise);
                (v as i16).saturating_add(jitter)
            };
            ch1.push((sample(i), sample(q)));
            ch2.push((sample(0.5 * i), sample(0.5 * q)));
        }
        ScopeFrame { ch1, ch2 }
    }

    fn health(&mut self) -> HealthFrame {
        let value = serde_json::json!({
            "Transceiver": {"Value": true, "Enum": 0},
            "Pedestal": {"Value": true, "Enum": 0},
            "Transmit": {"Value": self.go, "Enum": if self.go { 0 } else { 2 }},
            "Pedestal AZ": {"Value": format!("{:.2} deg", self.azimuth), "Enum": 0},
            "Pedestal EL": {"Value": format!("{:.2} deg", self.config.elevation), "Enum": 0},
            "rayRate": self.config.frame_rate_hz * self.config.rays_per_frame as f32,
            "tic": self.frame,
        });
        HealthFrame::new(value.to_string())
    }

    fn ray(&mut self) -> RayFrame {
        let gates = usize::from(self.config.gates);
        let az = self.azimuth;
        let values = (0..gates)
            .map(|g| {
                let r = g as f32 / gates.max(1) as f32;
                let cell = (3.0 * az.to_radians()).sin() * (12.0 * r).cos();
                let base = 96.0 + 80.0 * cell * (1.0 - r);
                let jitter: f32 = self.rng.random_range(-6.0..6.0);
                (base + jitter).clamp(1.0, 255.0) as u8
            })
            .collect();
        let header = RayHeader {
            flag: RayHeader::make_flag(self.ray_counter, self.sweep_counter),
            elevation_start: elevation_to_raw(self.config.elevation),
            elevation_end: elevation_to_raw(self.config.elevation),
            azimuth_start: azimuth_to_raw(az),
            azimuth_end: azimuth_to_raw(az + 1.0),
            range_start: 0,
            range_delta: self.config.range_delta_m,
            sample_count: self.config.gates,
        };

        self.ray_counter = (self.ray_counter + 1) % RAY_COUNTER_MODULUS;
        self.azimuth += 1.0;
        if self.azimuth >= 360.0 {
            self.azimuth -= 360.0;
            self.sweep_counter = (self.sweep_counter + 1) & 0x03;
        }

        RayFrame {
            product: Product::Z,
            header,
            values,
        }
    }

    fn queue<F: EncodeFrame>(&mut self, frame: &F) {
        self.pending_output.push_back(frame.encode(&self.table));
    }

    /// Take the next encoded frame, if any
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    pub fn output_count(&self) -> usize {
        self.pending_output.len()
    }

    pub fn clear_output(&mut self) {
        self.pending_output.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_protocol::{Frame, FrameDecoder};

    fn radar() -> VirtualRadar {
        VirtualRadar::new(VirtualRadarConfig {
            seed: Some(7),
            scope_samples: 64,
            gates: 20,
            ..Default::default()
        })
    }

    fn decode_all(radar: &mut VirtualRadar, decoder: &mut FrameDecoder) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(bytes) = radar.take_output() {
            if let Some(frame) = decoder.decode(&bytes).unwrap() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn test_open_sends_definition_then_control() {
        let mut radar = radar();
        radar.open();
        assert_eq!(radar.output_count(), 2);

        let mut bare = TagTable::empty();
        bare.insert("Definition", 1);
        let mut decoder = FrameDecoder::with_table("demo", bare);
        // Definition is silent but teaches the decoder every other tag
        let definition = radar.take_output().unwrap();
        assert_eq!(decoder.decode(&definition).unwrap(), None);
        assert_eq!(decoder.table(), &TagTable::default());

        match decoder.decode(&radar.take_output().unwrap()).unwrap() {
            Some(Frame::Control(control)) => {
                assert_eq!(control.pathway, "demo");
                assert_eq!(control.control[0].command, "t y");
            }
            other => panic!("expected control, got {:?}", other),
        }
    }

    #[test]
    fn test_greeting_starts_stream() {
        let mut radar = radar();
        assert!(!radar.is_streaming());
        assert_eq!(radar.handle_text(&Command::greet("demo").to_json()), None);
        assert!(radar.is_streaming());
        assert!(!radar.has_output());
    }

    #[test]
    fn test_known_commands_ack() {
        let mut radar = radar();
        for cmd in ["t y", "t z", "t w 1", "t w 2"] {
            let response = radar.respond(cmd);
            assert!(response.is_ack());
            assert_eq!(response.to_wire(), format!("A ACK {cmd}"));
        }
        assert_eq!(radar.rate(), RATE_TRY_2);

        radar.respond("t z");
        assert!(!radar.is_transmitting());
    }

    #[test]
    fn test_unknown_command_naks() {
        let mut radar = radar();
        let envelope = Command::message("demo", "t prf 1000").to_json();
        let response = radar.handle_text(&envelope).unwrap();
        assert!(!response.is_ack());
        assert_eq!(response.to_wire(), "N NAK t prf 1000");
        assert_eq!(radar.output_count(), 1);
    }

    #[test]
    fn test_step_emits_scope_rays_and_health() {
        let mut radar = radar();
        let mut decoder = FrameDecoder::new("demo");
        let health_every = radar.health_every();
        assert_eq!(health_every, 7);

        let mut health = 0;
        let mut rays = 0;
        for _ in 0..health_every {
            radar.step();
            for frame in decode_all(&mut radar, &mut decoder) {
                match frame {
                    Frame::Health(h) => {
                        assert!(h.value().is_ok());
                        health += 1;
                    }
                    Frame::Ray { ray, skip } => {
                        assert_eq!(skip, None);
                        assert_eq!(ray.values.len(), 20);
                        rays += 1;
                    }
                    Frame::Scope(scope) => assert_eq!(scope.count, 64),
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
        assert_eq!(health, 1);
        assert_eq!(rays, 6 * health_every as usize);
    }

    #[test]
    fn test_counters_wrap_over_a_rotation() {
        let mut radar = radar();
        let mut decoder = FrameDecoder::new("demo");
        // 61 frames of 6 rays: one full turn and a bit
        for _ in 0..61 {
            radar.step();
        }
        let rays: Vec<_> = decode_all(&mut radar, &mut decoder)
            .into_iter()
            .filter_map(|f| match f {
                Frame::Ray { ray, .. } => Some(ray),
                _ => None,
            })
            .collect();
        assert_eq!(rays.len(), 366);
        assert_eq!(decoder.skips(), 0);
        assert_eq!(rays[63].counter, 63);
        assert_eq!(rays[64].counter, 0);
        assert_eq!(rays[359].sweep, 0);
        assert_eq!(rays[360].sweep, 1);
        assert!((rays[360].azimuth_start - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_stopped_scope_is_noise_only() {
        let mut radar = radar();
        radar.respond("t z");
        let scope = radar.scope();
        let limit = radar.config.noise;
        assert!(scope.ch1.iter().all(|&(i, q)| i.abs() <= limit && q.abs() <= limit));
    }

    #[test]
    fn test_tukey_window_shape() {
        let w = tukey_window(100, 0.1);
        assert_eq!(w.len(), 100);
        assert_eq!(w[0], 0.0);
        assert_eq!(w[99], 0.0);
        assert_eq!(w[50], 1.0);
        assert!(w[5] > 0.0 && w[5] < 1.0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn unknown_payloads_nak(payload in "[a-z0-9 ]{0,16}") {
                prop_assume!(!["t y", "t z", "t w 1", "t w 2"].contains(&payload.as_str()));
                let mut radar = radar();
                let response = radar.respond(&payload);
                prop_assert!(!response.is_ack());
                prop_assert_eq!(response.text, format!("NAK {payload}"));
            }

            #[test]
            fn every_frame_decodes(seed in any::<u64>(), steps in 1usize..40) {
                let mut radar = VirtualRadar::new(VirtualRadarConfig {
                    seed: Some(seed),
                    scope_samples: 32,
                    gates: 16,
                    ..Default::default()
                });
                let mut decoder = FrameDecoder::new("demo");
                for _ in 0..steps {
                    radar.step();
                }
                let frames = decode_all(&mut radar, &mut decoder);
                let rays = frames.iter().filter(|f| matches!(f, Frame::Ray { .. })).count();
                prop_assert_eq!(rays, 6 * steps);
                prop_assert_eq!(decoder.skips(), 0);
            }
        }
    }
}
