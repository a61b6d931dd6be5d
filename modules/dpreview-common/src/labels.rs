//! Specification label normalization.
//!
//! Source pages label the same datum many ways ("Crop factor", "Focal length
//! multiplier:"). The map below folds those onto canonical schema fields.
//! Extra entries can be supplied in a TOML file:
//!
//! ```toml
//! [labels]
//! "sensor readout" = "SensorType"
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::{DpreviewError, Result};
use crate::schema::field_kind;

const BUILTIN: &[(&str, &str)] = &[
    // Dates & pricing
    ("announced", "Announced"),
    ("announcement date", "Announced"),
    ("msrp", "MSRP"),
    ("price", "BuyingOptions"),
    ("buying options", "BuyingOptions"),
    // Body & build
    ("body type", "BodyType"),
    ("body material", "BodyMaterial"),
    ("dimensions", "Dimensions"),
    ("weight (inc. batteries)", "WeightIncBatteries"),
    ("weight", "WeightIncBatteries"),
    ("durability", "Durability"),
    ("environmentally sealed", "EnvironmentallySealed"),
    // Sensor
    ("sensor type", "SensorType"),
    ("sensor", "SensorType"),
    ("sensor size", "SensorSize"),
    ("effective pixels", "EffectivePixels"),
    ("megapixels", "EffectivePixels"),
    ("processor", "Processor"),
    ("image processor", "Processor"),
    ("focal length multiplier", "FocalLengthMultiplier"),
    ("crop factor", "FocalLengthMultiplier"),
    ("sensor photo detectors", "SensorPhotoDetectors"),
    // ISO
    ("iso", "ISO"),
    ("iso sensitivity", "ISO"),
    ("boosted iso maximum", "BoostedISOMaximum"),
    ("boosted iso minimum", "BoostedISOMinimum"),
    ("boosted iso (maximum)", "BoostedISOMaximum"),
    ("boosted iso (minimum)", "BoostedISOMinimum"),
    ("iso (boosted)", "BoostedISOMaximum"),
    ("extended iso", "BoostedISOMaximum"),
    // Autofocus
    ("autofocus", "Autofocus"),
    ("af system", "Autofocus"),
    ("autofocus assist lamp", "AutofocusAssistLamp"),
    ("af assist lamp", "AutofocusAssistLamp"),
    ("af assist", "AutofocusAssistLamp"),
    ("number of focus points", "NumberOfFocusPoints"),
    ("focus points", "NumberOfFocusPoints"),
    // Exposure & metering
    ("ae bracketing", "AEBracketing"),
    ("auto exposure bracketing", "AEBracketing"),
    ("aperture priority", "AperturePriority"),
    ("exposure compensation", "ExposureCompensation"),
    ("exposure modes", "ExposureModes"),
    ("manual exposure mode", "ManualExposureMode"),
    ("metering modes", "MeteringModes"),
    ("shutter priority", "ShutterPriority"),
    // Shutter
    ("maximum shutter speed", "MaximumShutterSpeed"),
    ("max shutter speed", "MaximumShutterSpeed"),
    ("maximum shutter speed (electronic)", "MaximumShutterSpeedElectronic"),
    ("minimum shutter speed", "MinimumShutterSpeed"),
    ("min shutter speed", "MinimumShutterSpeed"),
    // Screen
    ("screen size", "ScreenSize"),
    ("screen", "ScreenSize"),
    ("lcd", "ScreenSize"),
    ("screen dots", "ScreenDots"),
    ("screen resolution", "ScreenDots"),
    ("screen type", "ScreenType"),
    ("touch screen", "TouchScreen"),
    ("articulated lcd", "ArticulatedLCD"),
    ("articulating screen", "ArticulatedLCD"),
    // Viewfinder
    ("viewfinder type", "ViewfinderType"),
    ("viewfinder", "ViewfinderType"),
    ("viewfinder coverage", "ViewfinderCoverage"),
    ("viewfinder magnification", "ViewfinderMagnification"),
    ("viewfinder resolution", "ViewfinderResolution"),
    ("field of view", "FieldOfView"),
    // Video
    ("format", "Format"),
    ("video format", "Format"),
    ("modes", "Modes"),
    ("video modes", "Modes"),
    ("resolutions", "Resolutions"),
    ("video resolutions", "Resolutions"),
    ("microphone", "Microphone"),
    ("microphone port", "MicrophonePort"),
    ("speaker", "Speaker"),
    ("headphone port", "HeadphonePort"),
    ("timelapse recording", "TimelapseRecording"),
    // Image
    ("color filter array", "ColorFilterArray"),
    ("color filter", "ColorFilterArray"),
    ("color space", "ColorSpace"),
    ("color spaces", "ColorSpace"),
    ("custom white balance", "CustomWhiteBalance"),
    ("file format", "FileFormat"),
    ("image ratio w:h", "ImageRatioWh"),
    ("aspect ratio", "ImageRatioWh"),
    ("jpeg quality levels", "JPEGQualityLevels"),
    ("max resolution", "MaxResolution"),
    ("maximum resolution", "MaxResolution"),
    ("other resolutions", "OtherResolutions"),
    ("uncompressed format", "UncompressedFormat"),
    ("raw format", "UncompressedFormat"),
    ("wb bracketing", "WBBracketing"),
    ("white balance presets", "WhiteBalancePresets"),
    // Flash
    ("built-in flash", "BuiltInFlash"),
    ("built in flash", "BuiltInFlash"),
    ("external flash", "ExternalFlash"),
    ("flash modes", "FlashModes"),
    ("flash range", "FlashRange"),
    ("flash x-sync speed", "FlashXSyncSpeed"),
    ("flash x sync speed", "FlashXSyncSpeed"),
    ("flash sync speed", "FlashXSyncSpeed"),
    // Battery
    ("battery", "Battery"),
    ("battery description", "BatteryDescription"),
    ("battery life (cipa)", "BatteryLifeCIPA"),
    ("battery life", "BatteryLifeCIPA"),
    // Connectivity
    ("usb", "USB"),
    ("wireless", "Wireless"),
    ("wifi", "Wireless"),
    ("wi-fi", "Wireless"),
    ("bluetooth", "WirelessNotes"),
    ("wireless notes", "WirelessNotes"),
    ("gps", "GPS"),
    ("gps notes", "GPSNotes"),
    ("hdmi", "HDMI"),
    ("remote control", "RemoteControl"),
    ("usb charging", "USBCharging"),
    // Lens
    ("lens mount", "LensMount"),
    ("mount", "LensMount"),
    ("number of lenses", "NumberOfLenses"),
    // Storage
    ("storage", "StorageTypes"),
    ("storage types", "StorageTypes"),
    ("memory card", "StorageTypes"),
    // Other features
    ("image stabilization", "ImageStabilization"),
    ("cipa image stabilization rating", "CIPAImageStabilizationRating"),
    ("image stabilization notes", "ImageStabilizationNotes"),
    ("continuous drive", "ContinuousDrive"),
    ("drive modes", "DriveModes"),
    ("live view", "LiveView"),
    ("manual focus", "ManualFocus"),
    ("orientation sensor", "OrientationSensor"),
    ("self-timer", "SelfTimer"),
    ("digital zoom", "DigitalZoom"),
    ("scene modes", "SceneModes"),
    ("subject / scene modes", "SubjectSceneModes"),
    ("review preview", "ReviewPreview"),
];

/// Fold a raw label to its lookup key: lowercase, colons removed, whitespace
/// collapsed to single spaces and trimmed.
pub fn normalize_label(raw: &str) -> String {
    raw.replace(':', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Raw label → canonical field lookup table.
#[derive(Debug, Clone)]
pub struct LabelMap {
    entries: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LabelOverlay {
    #[serde(default)]
    labels: HashMap<String, String>,
}

impl LabelMap {
    /// The built-in table.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(raw, field)| (normalize_label(raw), (*field).to_string()))
            .collect();
        Self { entries }
    }

    /// Add or replace entries. Every target must be a canonical field name.
    pub fn extend<I, K, V>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (raw, field) in entries {
            let field = field.into();
            if field_kind(&field).is_none() {
                return Err(DpreviewError::Config(format!(
                    "label '{}' maps to unknown field '{field}'",
                    raw.as_ref()
                )));
            }
            self.entries.insert(normalize_label(raw.as_ref()), field);
        }
        Ok(())
    }

    /// Built-in table overlaid with a TOML `[labels]` file.
    pub fn with_overlay(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read label map: {}", path.display()))?;
        let overlay: LabelOverlay = toml::from_str(&content)
            .with_context(|| format!("Failed to parse label map: {}", path.display()))?;

        let mut map = Self::builtin();
        let added = overlay.labels.len();
        map.extend(overlay.labels)?;
        tracing::info!(path = %path.display(), added, "Loaded label map overlay");
        Ok(map)
    }

    /// Canonical field for a raw label, if mapped.
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.entries.get(&normalize_label(raw)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn case_and_whitespace_variants_map_identically() {
        let map = LabelMap::builtin();
        for raw in ["Body type", "BODY TYPE", "  body   type: ", "Body\ttype:"] {
            assert_eq!(map.lookup(raw), Some("BodyType"), "{raw:?}");
        }
    }

    #[test]
    fn colon_inside_label_is_ignored() {
        let map = LabelMap::builtin();
        assert_eq!(map.lookup("Image ratio w:h"), Some("ImageRatioWh"));
        assert_eq!(map.lookup("Image ratio wh:"), Some("ImageRatioWh"));
    }

    #[test]
    fn unknown_label_is_unmapped() {
        assert_eq!(LabelMap::builtin().lookup("Flux capacitor"), None);
    }

    #[test]
    fn builtin_targets_are_canonical() {
        for (_, field) in BUILTIN {
            assert!(field_kind(field).is_some(), "{field} is not a canonical field");
        }
    }

    #[test]
    fn overlay_adds_and_overrides_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[labels]\n\"Sensor readout\" = \"SensorType\"\n\"screen\" = \"ScreenType\""
        )
        .unwrap();

        let map = LabelMap::with_overlay(file.path()).unwrap();
        assert_eq!(map.lookup("sensor readout"), Some("SensorType"));
        assert_eq!(map.lookup("Screen"), Some("ScreenType"));
        assert_eq!(map.lookup("Body type"), Some("BodyType"));
    }

    #[test]
    fn overlay_with_unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[labels]\n\"weird\" = \"NotAField\"").unwrap();
        let err = LabelMap::with_overlay(file.path()).unwrap_err();
        assert!(matches!(err, DpreviewError::Config(_)));
    }
}
