const DOCUMENTATION: &str = r#"# Papaya settings. You may edit this file, but be aware that formatting and comments will not
# be preserved if it is rewritten with `--write-settings`.

# zoom: screen pixels per image pixel, from 0.01 to 32. Output images are rendered at image size * zoom.
# output_suffix: appended to the input's file stem to name the output, which is always a PNG.
# log_level: one of "off", "error", "warn", "info", "debug", "trace".
# invert: pass images through a color inversion node before writing them out.

"#;

use papaya_core::state::document::Viewport;

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub zoom: f32,
    pub output_suffix: String,
    pub log_level: String,
    pub invert: bool,
    #[serde(skip)]
    failed_to_load: bool,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            output_suffix: "-papaya".to_owned(),
            log_level: "debug".to_owned(),
            invert: true,
            failed_to_load: false,
        }
    }
}
impl Settings {
    const FILENAME: &'static str = "settings.toml";
    /// Shared global settings, loaded from user preferences.
    /// (Or defaulted, if unavailable for some reason)
    #[must_use]
    pub fn get() -> &'static Self {
        static GLOBAL_SETTINGS: std::sync::OnceLock<Settings> = std::sync::OnceLock::new();

        GLOBAL_SETTINGS.get_or_init(|| {
            let mut dir = preferences_dir();
            match dir.as_mut() {
                None => Self::no_path(),
                Some(dir) => {
                    dir.push(Self::FILENAME);
                    Self::load_or_default(dir)
                }
            }
        })
    }
    #[must_use]
    pub fn no_path() -> Self {
        log::warn!("Settings weren't available, defaulting.");
        Self {
            failed_to_load: true,
            ..Self::default()
        }
    }
    #[must_use]
    fn load_or_default(path: &std::path::Path) -> Self {
        let settings: anyhow::Result<Self> = try_block::try_block! {
            let string = std::fs::read_to_string(path)?;
            Ok(Self::parse(&string)?)
        };

        match settings {
            Ok(settings) => settings,
            Err(e) => {
                log::debug!("Couldn't read {path:?}: {e:#}");
                Self::no_path()
            }
        }
    }
    /// Parse and validate settings from TOML text. Missing fields take their defaults.
    pub fn parse(string: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(string)?;
        let zooms = Viewport::MIN_ZOOM..=Viewport::MAX_ZOOM;
        if !zooms.contains(&settings.zoom) {
            anyhow::bail!(
                "zoom must be between {} and {}, got {}",
                zooms.start(),
                zooms.end(),
                settings.zoom
            );
        }
        settings.level_filter()?;
        Ok(settings)
    }
    /// Return true if loading user's settings failed. This can be useful for
    /// displaying a warning.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    pub fn level_filter(&self) -> anyhow::Result<log::LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown log level {:?}", self.log_level))
    }
    /// Settings as they'd be written to disk, documentation included.
    pub fn to_documented_string(&self) -> anyhow::Result<String> {
        let string = toml::ser::to_string_pretty(self)?;
        Ok(DOCUMENTATION.to_owned() + &string)
    }
    pub fn save(&self) -> anyhow::Result<std::path::PathBuf> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        std::fs::write(&preferences, self.to_documented_string()?)?;
        Ok(preferences)
    }
}
