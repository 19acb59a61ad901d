/// Status pages served by the ISG's embedded web server. The query-string
/// paths are fixed across firmware versions but not documented by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    InfoSystem,
    InfoHeatPump,
    DiagnosisSystemStatus,
    DiagnosisHeatPumpStatus,
    DiagnosisSystem,
    ProfileNetwork,
}

impl Page {
    pub fn path(self) -> &'static str {
        match self {
            Page::InfoSystem => "/?s=1,0",
            Page::InfoHeatPump => "/?s=1,1",
            Page::DiagnosisSystemStatus => "/?s=2,0",
            Page::DiagnosisHeatPumpStatus => "/?s=2,2",
            Page::DiagnosisSystem => "/?s=2,7",
            Page::ProfileNetwork => "/?s=5,0",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Page::InfoSystem => "Info > System",
            Page::InfoHeatPump => "Info > Heat Pump",
            Page::DiagnosisSystemStatus => "Diagnosis > System Status",
            Page::DiagnosisHeatPumpStatus => "Diagnosis > Heat Pump Status",
            Page::DiagnosisSystem => "Diagnosis > System",
            Page::ProfileNetwork => "Profile > Network",
        }
    }

    /// The pages fetched on every poll cycle. Diagnosis > System and
    /// Profile > Network only carry device identity and are read at startup.
    pub const DATA_PAGES: [Page; 4] = [
        Page::InfoSystem,
        Page::InfoHeatPump,
        Page::DiagnosisSystemStatus,
        Page::DiagnosisHeatPumpStatus,
    ];
}

/// How a raw token is turned into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// `21,5°C`
    Temperature,
    /// `43,0%`
    Percent,
    /// `12,5KWh` or `3,250MWh`, normalized to kWh
    Energy,
    /// plain number, comma decimal separator
    Count,
    /// on/off status icon or textual token
    OnOff,
}

/// How a value behaves over time, selecting the reconciliation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    /// Instantaneous reading, published as-is
    Gauge,
    /// Counts up during the day and resets at a day boundary; folded into a
    /// monotonic lifetime total before publishing
    DailyCounter,
    /// On/off state
    Status,
}

/// UI language configured on the ISG. Row labels are rendered localized, so
/// extraction has to resolve labels through the language detected on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    German,
}

impl Language {
    /// Maps the marker text of the `eingestelle_sprache` div.
    pub fn from_marker(marker: &str) -> Option<Language> {
        match marker.trim().to_uppercase().as_str() {
            "ENGLISH" => Some(Language::English),
            "DEUTSCH" => Some(Language::German),
            _ => None,
        }
    }
}

/// Row and table header labels as the ISG renders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    ActualTemperature1,
    RelativeHumidity1,
    OutsideTemperature,
    ActualTemperatureHk1,
    SetTemperatureHk1,
    AmountOfHeat,
    PowerConsumption,
    VdHeatingDay,
    VdHeatingTotal,
    Starts,
    Compressor,
    HeatPumpStatus,
    AuxiliaryHeater,
    BoosterStage1,
    BoosterStage2,
    OperatingMode,
    Defrost,
    MajorVersion,
    MinorVersion,
    Revision,
}

impl Label {
    pub fn text(self, lang: Language) -> &'static str {
        let (en, de) = match self {
            Label::ActualTemperature1 => ("ACTUAL TEMPERATURE 1", "ISTTEMPERATUR 1"),
            Label::RelativeHumidity1 => ("RELATIVE HUMIDITY 1", "RAUMFEUCHTE 1"),
            Label::OutsideTemperature => ("OUTSIDE TEMPERATURE", "AUSSENTEMPERATUR"),
            Label::ActualTemperatureHk1 => ("ACTUAL TEMPERATURE HK 1", "ISTTEMPERATUR HK 1"),
            Label::SetTemperatureHk1 => ("SET TEMPERATURE HK 1", "SOLLTEMPERATUR HK 1"),
            Label::AmountOfHeat => ("AMOUNT OF HEAT", "WÄRMEMENGE"),
            Label::PowerConsumption => ("POWER CONSUMPTION", "LEISTUNGSAUFNAHME"),
            Label::VdHeatingDay => ("VD HEATING DAY", "VD HEIZEN TAG"),
            Label::VdHeatingTotal => ("VD HEATING TOTAL", "VD HEIZEN SUMME"),
            Label::Starts => ("STARTS", "STARTS"),
            Label::Compressor => ("COMPRESSOR", "VERDICHTER"),
            Label::HeatPumpStatus => ("HEAT PUMP STATUS", "STATUS WÄRMEPUMPE"),
            Label::AuxiliaryHeater => ("AUXILIARY HEATER", "BEGLEITHEIZUNG"),
            Label::BoosterStage1 => ("BOOSTER HEATER STAGE 1", "NHZ STUFE 1"),
            Label::BoosterStage2 => ("BOOSTER HEATER STAGE 2", "NHZ STUFE 2"),
            Label::OperatingMode => ("OPERATING MODE", "BETRIEBSSTATUS"),
            Label::Defrost => ("DEFROST", "ABTAUEN"),
            Label::MajorVersion => ("Major version", "Hauptversionsnummer"),
            Label::MinorVersion => ("Minor version", "Nebenversionsnummer"),
            Label::Revision => ("Revision", "Revisionsnummer"),
        };
        match lang {
            Language::English => en,
            Language::German => de,
        }
    }
}

/// One scraped measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPoint {
    /// Stable key, used for the snapshot, the outbound payload and the
    /// persisted counter state
    pub key: &'static str,
    pub page: Page,
    pub kind: PointKind,
    pub format: ValueFormat,
    /// Restricts the row lookup to the table whose first header matches,
    /// for pages where the same row label appears in several tables
    pub table: Option<Label>,
    pub row: Label,
}

pub static DATA_POINTS: [DataPoint; 15] = [
    DataPoint {
        key: "room_temperature",
        page: Page::InfoSystem,
        kind: PointKind::Gauge,
        format: ValueFormat::Temperature,
        table: None,
        row: Label::ActualTemperature1,
    },
    DataPoint {
        key: "room_relative_humidity",
        page: Page::InfoSystem,
        kind: PointKind::Gauge,
        format: ValueFormat::Percent,
        table: None,
        row: Label::RelativeHumidity1,
    },
    DataPoint {
        key: "outside_temperature",
        page: Page::InfoSystem,
        kind: PointKind::Gauge,
        format: ValueFormat::Temperature,
        table: None,
        row: Label::OutsideTemperature,
    },
    DataPoint {
        key: "flow_temperature",
        page: Page::InfoSystem,
        kind: PointKind::Gauge,
        format: ValueFormat::Temperature,
        table: None,
        row: Label::ActualTemperatureHk1,
    },
    DataPoint {
        key: "target_flow_temperature",
        page: Page::InfoSystem,
        kind: PointKind::Gauge,
        format: ValueFormat::Temperature,
        table: None,
        row: Label::SetTemperatureHk1,
    },
    DataPoint {
        key: "heating_energy",
        page: Page::InfoHeatPump,
        kind: PointKind::DailyCounter,
        format: ValueFormat::Energy,
        table: Some(Label::AmountOfHeat),
        row: Label::VdHeatingDay,
    },
    DataPoint {
        key: "total_heating_energy",
        page: Page::InfoHeatPump,
        kind: PointKind::Gauge,
        format: ValueFormat::Energy,
        table: Some(Label::AmountOfHeat),
        row: Label::VdHeatingTotal,
    },
    DataPoint {
        key: "power_consumption",
        page: Page::InfoHeatPump,
        kind: PointKind::DailyCounter,
        format: ValueFormat::Energy,
        table: Some(Label::PowerConsumption),
        row: Label::VdHeatingDay,
    },
    DataPoint {
        key: "total_power_consumption",
        page: Page::InfoHeatPump,
        kind: PointKind::Gauge,
        format: ValueFormat::Energy,
        table: Some(Label::PowerConsumption),
        row: Label::VdHeatingTotal,
    },
    DataPoint {
        key: "compressor_starts",
        page: Page::InfoHeatPump,
        kind: PointKind::Gauge,
        format: ValueFormat::Count,
        table: Some(Label::Starts),
        row: Label::Compressor,
    },
    DataPoint {
        key: "compressor_status",
        page: Page::DiagnosisHeatPumpStatus,
        kind: PointKind::Status,
        format: ValueFormat::OnOff,
        table: Some(Label::HeatPumpStatus),
        row: Label::Compressor,
    },
    DataPoint {
        key: "auxiliary_heater_status",
        page: Page::DiagnosisHeatPumpStatus,
        kind: PointKind::Status,
        format: ValueFormat::OnOff,
        table: Some(Label::HeatPumpStatus),
        row: Label::AuxiliaryHeater,
    },
    DataPoint {
        key: "booster_heater_1_status",
        page: Page::DiagnosisHeatPumpStatus,
        kind: PointKind::Status,
        format: ValueFormat::OnOff,
        table: Some(Label::HeatPumpStatus),
        row: Label::BoosterStage1,
    },
    DataPoint {
        key: "booster_heater_2_status",
        page: Page::DiagnosisHeatPumpStatus,
        kind: PointKind::Status,
        format: ValueFormat::OnOff,
        table: Some(Label::HeatPumpStatus),
        row: Label::BoosterStage2,
    },
    DataPoint {
        key: "defrost_status",
        page: Page::DiagnosisSystemStatus,
        kind: PointKind::Status,
        format: ValueFormat::OnOff,
        table: Some(Label::OperatingMode),
        row: Label::Defrost,
    },
];

/// Data points scraped from the given page.
pub fn points_on(page: Page) -> impl Iterator<Item = &'static DataPoint> {
    DATA_POINTS.iter().filter(move |p| p.page == page)
}

pub fn find(key: &str) -> Option<&'static DataPoint> {
    DATA_POINTS.iter().find(|p| p.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique() {
        for (i, a) in DATA_POINTS.iter().enumerate() {
            for b in &DATA_POINTS[i + 1..] {
                assert_ne!(a.key, b.key, "duplicate data point key");
            }
        }
    }

    #[test]
    fn test_all_points_on_data_pages() {
        for p in &DATA_POINTS {
            assert!(
                Page::DATA_PAGES.contains(&p.page),
                "{} is on a page that is never polled",
                p.key
            );
        }
    }

    #[test]
    fn test_counters_are_energies() {
        // the reconciler accumulates kWh; anything daily-reset must parse as energy
        for p in DATA_POINTS.iter().filter(|p| p.kind == PointKind::DailyCounter) {
            assert_eq!(p.format, ValueFormat::Energy, "{}", p.key);
        }
    }

    #[test]
    fn test_points_on_filters_by_page() {
        let keys: Vec<&str> = points_on(Page::InfoSystem).map(|p| p.key).collect();
        assert_eq!(
            keys,
            vec![
                "room_temperature",
                "room_relative_humidity",
                "outside_temperature",
                "flow_temperature",
                "target_flow_temperature",
            ]
        );
    }

    #[test]
    fn test_find() {
        assert!(find("heating_energy").is_some());
        assert!(find("no_such_key").is_none());
    }
}
