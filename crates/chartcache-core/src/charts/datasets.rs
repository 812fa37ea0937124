use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use super::model::{ChartKind, ChartSpec, Series, YAxis};
use crate::api::ApiError;

/// Date format the chart API expects in request bodies.
const API_DATE_FORMAT: &str = "%Y-%m-%d";

const COLOR_GOLD: &str = "#FFC800";
const COLOR_GREEN: &str = "#4CAF50";
const COLOR_OLD_GOLD: &str = "#D4AF37";

/// One chart's worth of data: where to fetch it and how to shape it.
pub trait Dataset: Send + Sync {
    /// Stable identifier, used as the cache key prefix. Must not contain ':'.
    fn id(&self) -> &'static str;

    fn endpoint(&self) -> &'static str;

    /// Request body, or `None` for parameterless datasets.
    fn params(&self) -> Option<Value>;

    /// Turn API rows into the cacheable chart. Rows that don't have the
    /// expected shape make the whole response invalid.
    fn transform(&self, rows: Vec<Value>) -> Result<ChartSpec, ApiError>;

    /// What to show the user when the chart can't be loaded.
    fn error_message(&self) -> &'static str;
}

fn parse_rows<T: DeserializeOwned>(dataset: &str, rows: Vec<Value>) -> Result<Vec<T>, ApiError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value(row).map_err(|e| {
                ApiError::InvalidResponse(format!("{} row {}: {}", dataset, i, e))
            })
        })
        .collect()
}

// ============================================================================
// Demand vs firm energy
// ============================================================================

#[derive(Debug, Deserialize)]
struct DemandRow {
    fecha: String,
    #[serde(rename = "Demanda Comercial por Sistema")]
    commercial_demand: Option<f64>,
    #[serde(rename = "Energía en Firme Cargo por Confiabilidad")]
    firm_energy: Option<f64>,
    #[serde(rename = "Obligación de Energía en Firme")]
    firm_energy_obligation: Option<f64>,
}

/// Daily commercial demand against firm energy for a date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandDataset {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DemandDataset {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

impl Default for DemandDataset {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2025, 5, 3).unwrap_or(NaiveDate::MIN),
        }
    }
}

impl Dataset for DemandDataset {
    fn id(&self) -> &'static str {
        "demand"
    }

    fn endpoint(&self) -> &'static str {
        "/v1/graficas/energia_electrica/grafica_demanda"
    }

    fn params(&self) -> Option<Value> {
        Some(json!({
            "fecha_inicio": self.start.format(API_DATE_FORMAT).to_string(),
            "fecha_fin": self.end.format(API_DATE_FORMAT).to_string(),
        }))
    }

    fn transform(&self, rows: Vec<Value>) -> Result<ChartSpec, ApiError> {
        let rows: Vec<DemandRow> = parse_rows(self.id(), rows)?;

        let series = |name: &str, color: &str, pick: fn(&DemandRow) -> Option<f64>| Series {
            name: name.to_string(),
            kind: None,
            y_axis: 0,
            color: color.to_string(),
            data: rows.iter().map(pick).collect(),
        };

        Ok(ChartSpec {
            kind: ChartKind::Line,
            title: "Demand vs firm energy".to_string(),
            subtitle: format!(
                "Source: API. {} → {}",
                self.start.format(API_DATE_FORMAT),
                self.end.format(API_DATE_FORMAT)
            ),
            x_axis_title: "Date".to_string(),
            categories: rows.iter().map(|r| r.fecha.clone()).collect(),
            y_axes: vec![YAxis {
                title: "Quantity".to_string(),
                opposite: false,
            }],
            series: vec![
                series("Commercial demand", COLOR_GOLD, |r| r.commercial_demand),
                series("Firm energy", COLOR_GREEN, |r| r.firm_energy),
                series("Firm energy obligation", COLOR_OLD_GOLD, |r| r.firm_energy_obligation),
            ],
        })
    }

    fn error_message(&self) -> &'static str {
        "Could not load the demand chart."
    }
}

// ============================================================================
// Installed capacity vs project progress (S-curve)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CapacityRow {
    /// Sent as either a label ("0-10%") or a bare number.
    porcentaje_de_avance: Value,
    suma_capacidad: Option<f64>,
    numero_proyectos: Option<f64>,
}

fn category_label(value: &Value) -> Result<String, ApiError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ApiError::InvalidResponse(format!(
            "progress category must be a string or number, got {}",
            other
        ))),
    }
}

/// Installed capacity and project count bucketed by completion percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityCurveDataset;

impl Dataset for CapacityCurveDataset {
    fn id(&self) -> &'static str {
        "capacity_progress_curve"
    }

    fn endpoint(&self) -> &'static str {
        "/v1/graficas/6g_proyecto/grafica_capacidad_porcentaje_avance_curva_s"
    }

    fn params(&self) -> Option<Value> {
        None
    }

    fn transform(&self, rows: Vec<Value>) -> Result<ChartSpec, ApiError> {
        let rows: Vec<CapacityRow> = parse_rows(self.id(), rows)?;
        let categories = rows
            .iter()
            .map(|r| category_label(&r.porcentaje_de_avance))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ChartSpec {
            kind: ChartKind::Column,
            title: "Installed capacity vs % progress".to_string(),
            subtitle: "Source: XM. 2020-2024".to_string(),
            x_axis_title: "Progress percentage".to_string(),
            categories,
            y_axes: vec![
                YAxis {
                    title: "Installed capacity (MW)".to_string(),
                    opposite: false,
                },
                YAxis {
                    title: "Number of projects".to_string(),
                    opposite: true,
                },
            ],
            series: vec![
                Series {
                    name: "Installed capacity".to_string(),
                    kind: Some(ChartKind::Column),
                    y_axis: 0,
                    color: COLOR_GOLD.to_string(),
                    data: rows.iter().map(|r| r.suma_capacidad).collect(),
                },
                Series {
                    name: "Number of projects".to_string(),
                    kind: Some(ChartKind::Line),
                    y_axis: 1,
                    color: COLOR_GREEN.to_string(),
                    data: rows.iter().map(|r| r.numero_proyectos).collect(),
                },
            ],
        })
    }

    fn error_message(&self) -> &'static str {
        "Could not load the S-curve chart (capacity vs progress)."
    }
}
