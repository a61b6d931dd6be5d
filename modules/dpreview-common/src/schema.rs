//! Output record schema.
//!
//! Downstream tooling reads records by key, so the key sets below are the
//! contract: every record carries every top-level key and every canonical
//! specification field, whether or not the source page had data for it.

/// Value shape of a canonical specification field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
    /// `W x H x D unit` composite, parsed into a sub-record when possible.
    Dimensions,
}

/// Canonical specification fields in output order.
pub const SPEC_FIELDS: &[(&str, FieldKind)] = &[
    // Exposure
    ("AEBracketing", FieldKind::Text),
    ("AperturePriority", FieldKind::Text),
    ("ExposureCompensation", FieldKind::Text),
    ("ExposureModes", FieldKind::List),
    ("ManualExposureMode", FieldKind::Text),
    ("MeteringModes", FieldKind::List),
    ("ShutterPriority", FieldKind::Text),
    // Dates & pricing
    ("Announced", FieldKind::Text),
    ("BuyingOptions", FieldKind::Text),
    ("MSRP", FieldKind::Text),
    // Autofocus
    ("Autofocus", FieldKind::List),
    ("AutofocusAssistLamp", FieldKind::Text),
    ("NumberOfFocusPoints", FieldKind::Text),
    // Battery
    ("Battery", FieldKind::Text),
    ("BatteryDescription", FieldKind::Text),
    ("BatteryLifeCIPA", FieldKind::Text),
    // Body
    ("BodyMaterial", FieldKind::Text),
    ("BodyType", FieldKind::Text),
    ("Dimensions", FieldKind::Dimensions),
    ("Durability", FieldKind::Text),
    ("EnvironmentallySealed", FieldKind::Text),
    ("WeightIncBatteries", FieldKind::Text),
    // ISO
    ("BoostedISOMaximum", FieldKind::Text),
    ("BoostedISOMinimum", FieldKind::Text),
    ("ISO", FieldKind::Text),
    // Flash
    ("BuiltInFlash", FieldKind::Text),
    ("ExternalFlash", FieldKind::Text),
    ("FlashModes", FieldKind::Text),
    ("FlashRange", FieldKind::Text),
    ("FlashXSyncSpeed", FieldKind::Text),
    // Image
    ("ColorFilterArray", FieldKind::Text),
    ("ColorSpace", FieldKind::Text),
    ("CustomWhiteBalance", FieldKind::Text),
    ("EffectivePixels", FieldKind::Text),
    ("FileFormat", FieldKind::List),
    ("ImageRatioWh", FieldKind::Text),
    ("JPEGQualityLevels", FieldKind::Text),
    ("MaxResolution", FieldKind::Text),
    ("OtherResolutions", FieldKind::Text),
    ("UncompressedFormat", FieldKind::Text),
    ("WBBracketing", FieldKind::Text),
    ("WhiteBalancePresets", FieldKind::Text),
    // Sensor
    ("FocalLengthMultiplier", FieldKind::Text),
    ("Processor", FieldKind::Text),
    ("SensorPhotoDetectors", FieldKind::Text),
    ("SensorSize", FieldKind::Text),
    ("SensorType", FieldKind::Text),
    // Shutter
    ("MaximumShutterSpeed", FieldKind::Text),
    ("MaximumShutterSpeedElectronic", FieldKind::Text),
    ("MinimumShutterSpeed", FieldKind::Text),
    // Screen
    ("ArticulatedLCD", FieldKind::Text),
    ("ScreenDots", FieldKind::Text),
    ("ScreenSize", FieldKind::Text),
    ("ScreenType", FieldKind::Text),
    ("TouchScreen", FieldKind::Text),
    // Viewfinder
    ("FieldOfView", FieldKind::Text),
    ("ViewfinderCoverage", FieldKind::Text),
    ("ViewfinderMagnification", FieldKind::Text),
    ("ViewfinderResolution", FieldKind::Text),
    ("ViewfinderType", FieldKind::Text),
    // Video
    ("Format", FieldKind::Text),
    ("Microphone", FieldKind::Text),
    ("MicrophonePort", FieldKind::Text),
    ("Modes", FieldKind::List),
    ("Resolutions", FieldKind::Text),
    ("Speaker", FieldKind::Text),
    ("HeadphonePort", FieldKind::Text),
    ("TimelapseRecording", FieldKind::Text),
    // Connectivity
    ("GPS", FieldKind::Text),
    ("GPSNotes", FieldKind::Text),
    ("HDMI", FieldKind::Text),
    ("RemoteControl", FieldKind::Text),
    ("USB", FieldKind::Text),
    ("USBCharging", FieldKind::Text),
    ("Wireless", FieldKind::Text),
    ("WirelessNotes", FieldKind::Text),
    // Other features
    ("CIPAImageStabilizationRating", FieldKind::Text),
    ("ContinuousDrive", FieldKind::Text),
    ("DriveModes", FieldKind::List),
    ("ImageStabilization", FieldKind::Text),
    ("ImageStabilizationNotes", FieldKind::Text),
    ("LiveView", FieldKind::Text),
    ("ManualFocus", FieldKind::Text),
    ("OrientationSensor", FieldKind::Text),
    ("SelfTimer", FieldKind::Text),
    // Lens & storage
    ("LensMount", FieldKind::Text),
    ("NumberOfLenses", FieldKind::Text),
    ("StorageTypes", FieldKind::Text),
    // Modes
    ("DigitalZoom", FieldKind::Text),
    ("SceneModes", FieldKind::Text),
    ("SubjectSceneModes", FieldKind::Text),
    ("ReviewPreview", FieldKind::Text),
];

/// Key under which specification labels with no canonical mapping are kept.
pub const UNMAPPED_KEY: &str = "Unmapped";

/// Look up the kind of a canonical field. `None` means the name is not canonical.
pub fn field_kind(name: &str) -> Option<FieldKind> {
    SPEC_FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, kind)| *kind)
}

/// Expected type of a record key, as checked by directory validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    NullableString,
    Integer,
    StringList,
    Mapping,
    NullableMapping,
}

impl ValueType {
    pub fn describe(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::NullableString => "string or null",
            ValueType::Integer => "integer",
            ValueType::StringList => "list of strings",
            ValueType::Mapping => "mapping",
            ValueType::NullableMapping => "mapping or null",
        }
    }
}

/// Top-level record keys, in output order.
pub const REQUIRED_KEYS: &[(&str, ValueType)] = &[
    ("DPRReviewArchiveURL", ValueType::NullableString),
    ("ProductCode", ValueType::String),
    ("Award", ValueType::String),
    ("ImageURL", ValueType::String),
    ("Name", ValueType::String),
    ("ShortSpecs", ValueType::StringList),
    ("ReviewScore", ValueType::Integer),
    ("URL", ValueType::String),
    ("ReviewData", ValueType::NullableMapping),
    ("Specs", ValueType::Mapping),
];

/// Keys of a present `ReviewData` block.
pub const REVIEW_KEYS: &[(&str, ValueType)] = &[
    ("ExecutiveSummary", ValueType::String),
    ("ProductPhotos", ValueType::StringList),
    ("ReviewSummary", ValueType::Mapping),
    ("ASIN", ValueType::StringList),
];

/// Keys of `ReviewData.ReviewSummary`.
pub const REVIEW_SUMMARY_KEYS: &[(&str, ValueType)] = &[
    ("GoodFor", ValueType::NullableString),
    ("NotSoGoodFor", ValueType::NullableString),
    ("Conclusion", ValueType::NullableString),
];

/// Record key holding the archive reference; the only key backfill may touch.
pub const ARCHIVE_KEY: &str = "DPRReviewArchiveURL";
