// ============================================================================
// EDITOR SETTINGS — plain `key=value` config file in the OS config dir
// ============================================================================

use std::path::{Path, PathBuf};

use crate::canvas::ExpandConfig;
use crate::ops::rasterize::{RasterOptions, ResampleFilter};

const SETTINGS_FILE: &str = "beadfe_settings.cfg";

/// Editor tunables.  Every value falls back to its default when the file is
/// missing, a key is absent, or a value does not parse.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Cells a single flood fill may write before stopping.
    pub flood_fill_cap: usize,
    pub free_expand_chunk: i32,
    pub free_expand_margin: i32,
    /// deltaE above which an isolated bead is kept as detail.
    pub denoise_threshold: f64,
    pub max_undo_steps: usize,
    pub alpha_threshold: u8,
    pub default_target_width: u32,
    pub resample: ResampleFilter,
    /// Side length of a new free-mode canvas.
    pub free_initial_size: u32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            flood_fill_cap: 2000,
            free_expand_chunk: 20,
            free_expand_margin: 5,
            denoise_threshold: 55.0,
            max_undo_steps: 100,
            alpha_threshold: 128,
            default_target_width: 50,
            resample: ResampleFilter::Nearest,
            free_initial_size: 100,
        }
    }
}

impl EditorSettings {
    pub fn expand_config(&self) -> ExpandConfig {
        ExpandConfig {
            chunk: self.free_expand_chunk.max(1),
            margin: self.free_expand_margin.max(0),
        }
    }

    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions { alpha_threshold: self.alpha_threshold, filter: self.resample }
    }

    /// Get the settings file path, creating the config directory if needed.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("beadfe");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("BeadFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("BeadFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load from the default location.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines.  Unknown keys are ignored.
    pub fn parse(content: &str) -> Self {
        let d = Self::default();
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "flood_fill_cap" => {
                    s.flood_fill_cap = val.parse().unwrap_or(d.flood_fill_cap);
                }
                "free_expand_chunk" => {
                    s.free_expand_chunk =
                        val.parse().ok().filter(|&v: &i32| v >= 1).unwrap_or(d.free_expand_chunk);
                }
                "free_expand_margin" => {
                    s.free_expand_margin =
                        val.parse().ok().filter(|&v: &i32| v >= 0).unwrap_or(d.free_expand_margin);
                }
                "denoise_threshold" => {
                    s.denoise_threshold = val
                        .parse()
                        .ok()
                        .filter(|v: &f64| v.is_finite() && *v >= 0.0)
                        .unwrap_or(d.denoise_threshold);
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(d.max_undo_steps);
                }
                "alpha_threshold" => {
                    s.alpha_threshold = val.parse().unwrap_or(d.alpha_threshold);
                }
                "default_target_width" => {
                    s.default_target_width =
                        val.parse().ok().filter(|&v: &u32| v >= 1).unwrap_or(d.default_target_width);
                }
                "resample" => {
                    s.resample = ResampleFilter::from_label(val).unwrap_or(d.resample);
                }
                "free_initial_size" => {
                    s.free_initial_size =
                        val.parse().ok().filter(|&v: &u32| v >= 1).unwrap_or(d.free_initial_size);
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_cfg_string(&self) -> String {
        format!(
            "flood_fill_cap={}\n\
             free_expand_chunk={}\n\
             free_expand_margin={}\n\
             denoise_threshold={}\n\
             max_undo_steps={}\n\
             alpha_threshold={}\n\
             default_target_width={}\n\
             resample={}\n\
             free_initial_size={}\n",
            self.flood_fill_cap,
            self.free_expand_chunk,
            self.free_expand_margin,
            self.denoise_threshold,
            self.max_undo_steps,
            self.alpha_threshold,
            self.default_target_width,
            self.resample.label(),
            self.free_initial_size,
        )
    }

    /// Save to the default location.  Failures are logged, not raised.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_cfg_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let s = EditorSettings::parse("flood_fill_cap=500\nnonsense\nunknown_key=1\n");
        assert_eq!(s.flood_fill_cap, 500);
        assert_eq!(s.free_expand_chunk, 20);
        assert_eq!(s.denoise_threshold, 55.0);
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let s = EditorSettings::parse(
            "free_expand_chunk=0\nalpha_threshold=300\ndenoise_threshold=-1\nresample=cubic\n",
        );
        assert_eq!(s, EditorSettings::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let s = EditorSettings {
            flood_fill_cap: 1200,
            free_expand_chunk: 10,
            free_expand_margin: 2,
            denoise_threshold: 40.5,
            max_undo_steps: 30,
            alpha_threshold: 64,
            default_target_width: 80,
            resample: ResampleFilter::Smooth,
            free_initial_size: 64,
        };
        s.save_to(&path).unwrap();
        assert_eq!(EditorSettings::load_from(&path), s);
    }

    #[test]
    fn unreadable_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = EditorSettings::load_from(&dir.path().join("missing.cfg"));
        assert_eq!(s, EditorSettings::default());
    }

    #[test]
    fn expand_config_follows_settings() {
        let s = EditorSettings::parse("free_expand_chunk=12\nfree_expand_margin=3");
        assert_eq!(s.expand_config(), ExpandConfig { chunk: 12, margin: 3 });
    }
}
