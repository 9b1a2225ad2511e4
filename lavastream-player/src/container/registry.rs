use super::adts::AdtsProbe;
use super::matroska::MatroskaProbe;
use super::mp3::Mp3Probe;
use super::mp4::Mp4Probe;
use super::mpegts::MpegTsAdtsProbe;
use super::wav::WavProbe;
use super::ContainerProbe;
use std::sync::Arc;

/// Ordered set of container probes
#[derive(Clone)]
pub struct ProbeRegistry {
    probes: Vec<Arc<dyn ContainerProbe>>,
}

impl ProbeRegistry {
    pub fn new(probes: Vec<Arc<dyn ContainerProbe>>) -> Self {
        Self { probes }
    }

    pub fn probes(&self) -> &[Arc<dyn ContainerProbe>] {
        &self.probes
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn ContainerProbe>> {
        self.probes.iter().find(|p| p.name() == name).cloned()
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(Mp3Probe),
            Arc::new(Mp4Probe),
            Arc::new(MatroskaProbe),
            Arc::new(WavProbe),
            Arc::new(AdtsProbe),
            Arc::new(MpegTsAdtsProbe),
        ])
    }
}
