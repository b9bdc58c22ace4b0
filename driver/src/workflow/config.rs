use anyhow::Context;
use limnocore::wire::{AnimationParams, HeatmapStyle};
use limnocore::ControllerSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeatmapConfig {
    pub bandwidth: f64,
    pub opacity: f64,
    pub colormap: String,
    pub method: String,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        let style = HeatmapStyle::default();
        Self {
            bandwidth: 0.15,
            opacity: 0.7,
            colormap: style.colormap,
            method: style.method,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoConfig {
    pub parameter: String,
    pub fps: u32,
    pub frames_per_transition: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let params = AnimationParams::default();
        Self {
            parameter: params.parameter,
            fps: params.fps,
            frames_per_transition: params.frames_per_transition,
        }
    }
}

/// Client settings, loaded from YAML or assembled from CLI flags.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub bridge_address: SocketAddr,
    pub session_file: PathBuf,
    pub heatmap: HeatmapConfig,
    pub video: VideoConfig,
    pub opacity_range: (f64, f64),
    pub bandwidth_range: (f64, f64),
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            bridge_address: SocketAddr::from(([127, 0, 0, 1], 9000)),
            session_file: PathBuf::from(".limnoview/session.json"),
            heatmap: HeatmapConfig::default(),
            video: VideoConfig::default(),
            opacity_range: (0.0, 1.0),
            bandwidth_range: (0.01, 1.0),
        }
    }
}

impl ClientConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading client config {}", path_ref.display()))?;
        let config: ClientConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing client config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        server_url: Option<String>,
        session_file: Option<PathBuf>,
        bridge_address: Option<SocketAddr>,
    ) -> Self {
        Self::default().with_overrides(server_url, session_file, bridge_address)
    }

    /// Command-line values win over whatever the file or defaults say.
    pub fn with_overrides(
        mut self,
        server_url: Option<String>,
        session_file: Option<PathBuf>,
        bridge_address: Option<SocketAddr>,
    ) -> Self {
        if let Some(server_url) = server_url {
            self.server_url = server_url;
        }
        if let Some(session_file) = session_file {
            self.session_file = session_file;
        }
        if let Some(bridge_address) = bridge_address {
            self.bridge_address = bridge_address;
        }
        self
    }

    pub fn to_controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            opacity: self.heatmap.opacity,
            bandwidth: self.heatmap.bandwidth,
            opacity_range: self.opacity_range,
            bandwidth_range: self.bandwidth_range,
            style: HeatmapStyle {
                colormap: self.heatmap.colormap.clone(),
                method: self.heatmap.method.clone(),
            },
        }
    }

    pub fn animation_params(
        &self,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> AnimationParams {
        AnimationParams {
            parameter: self.video.parameter.clone(),
            start_date,
            end_date,
            fps: self.video.fps,
            frames_per_transition: self.video.frames_per_transition,
            colormap: self.heatmap.colormap.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_keeps_defaults() {
        let cfg = ClientConfig::from_args(Some("http://lake:8080".into()), None, None);
        assert_eq!(cfg.server_url, "http://lake:8080");
        assert_eq!(cfg.session_file, PathBuf::from(".limnoview/session.json"));
        let settings = cfg.to_controller_settings();
        assert_eq!(settings.opacity, 0.7);
        assert_eq!(settings.bandwidth_range, (0.01, 1.0));
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let cfg = ClientConfig {
            server_url: "http://from-file:5000".into(),
            ..ClientConfig::default()
        }
        .with_overrides(None, Some(PathBuf::from("/tmp/s.json")), None);
        assert_eq!(cfg.server_url, "http://from-file:5000");
        assert_eq!(cfg.session_file, PathBuf::from("/tmp/s.json"));
        assert_eq!(cfg.bridge_address, SocketAddr::from(([127, 0, 0, 1], 9000)));
    }

    #[test]
    fn config_load_reads_partial_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"server_url: http://10.0.0.5:5000\nheatmap:\n  colormap: viridis\nvideo:\n  fps: 24\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.server_url, "http://10.0.0.5:5000");
        assert_eq!(cfg.heatmap.colormap, "viridis");
        assert_eq!(cfg.heatmap.method, "idw");
        assert_eq!(cfg.video.fps, 24);
        assert_eq!(cfg.video.frames_per_transition, 10);
        assert_eq!(cfg.animation_params(None, None).colormap, "viridis");
    }

    #[test]
    fn config_load_reports_bad_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"bridge_address: [not, an, address]\n").unwrap();
        let path = temp.into_temp_path();
        assert!(ClientConfig::load(&path).is_err());
    }
}
