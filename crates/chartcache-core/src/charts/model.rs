//! Renderer-agnostic chart description.
//!
//! This is the shape the loader caches: everything a front end needs to draw
//! the chart, already derived from the raw API rows.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ChartKind {
    Line,
    Column,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct YAxis {
    pub title: String,
    /// Drawn on the right-hand side.
    #[serde(default)]
    pub opposite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Series {
    pub name: String,
    /// Overrides the chart-level kind for this series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChartKind>,
    /// Index into `ChartSpec::y_axes`.
    #[serde(default)]
    pub y_axis: usize,
    pub color: String,
    /// One point per category; `None` where the API had no value.
    pub data: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub subtitle: String,
    pub x_axis_title: String,
    pub categories: Vec<String>,
    pub y_axes: Vec<YAxis>,
    pub series: Vec<Series>,
}

impl ChartSpec {
    pub fn point_count(&self) -> usize {
        self.categories.len()
    }

    /// Categories and every series line up point for point.
    pub fn is_consistent(&self) -> bool {
        self.series.iter().all(|s| {
            s.data.len() == self.categories.len() && s.y_axis < self.y_axes.len().max(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChartSpec {
        ChartSpec {
            kind: ChartKind::Column,
            title: "t".into(),
            subtitle: "s".into(),
            x_axis_title: "x".into(),
            categories: vec!["a".into(), "b".into()],
            y_axes: vec![YAxis { title: "y".into(), opposite: false }],
            series: vec![Series {
                name: "n".into(),
                kind: None,
                y_axis: 0,
                color: "#FFC800".into(),
                data: vec![Some(1.0), None],
            }],
        }
    }

    #[test]
    fn test_consistency_check() {
        let mut spec = sample();
        assert!(spec.is_consistent());
        assert_eq!(spec.point_count(), 2);

        spec.series[0].data.pop();
        assert!(!spec.is_consistent());

        let mut spec = sample();
        spec.series[0].y_axis = 1;
        assert!(!spec.is_consistent());
    }

    #[test]
    fn test_serialized_kind_is_lowercase() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["kind"], "column");
        assert!(json["series"][0].get("kind").is_none());
        assert_eq!(json["series"][0]["data"][1], serde_json::Value::Null);
    }
}
