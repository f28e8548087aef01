use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Map, Value};

use crate::errors::{AppError, AppResult};

pub const DEFAULT_BUILDBOT_URL: &str = "http://build.chromium.org/p/chromium/";

/// Characters left unescaped in stdio link path segments
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'/');

/// Revisions in this range are Chromium commit positions
const COMMIT_POS_RANGE: std::ops::Range<i64> = 300_001..1_000_000;

/// Run metadata attached to every chart payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// perf id, e.g. `linux-release`
    pub bot: String,
    /// test suite name, e.g. `sunspider`
    pub test_name: String,
    pub builder_name: Option<String>,
    pub build_number: Option<String>,
    pub machine_group: String,
    pub buildbot_url: String,
}

impl BuildContext {
    pub fn new(
        bot: impl Into<String>,
        test_name: impl Into<String>,
        machine_group: impl Into<String>,
    ) -> Self {
        Self {
            bot: bot.into(),
            test_name: test_name.into(),
            builder_name: None,
            build_number: None,
            machine_group: machine_group.into(),
            buildbot_url: DEFAULT_BUILDBOT_URL.to_string(),
        }
    }

    pub fn with_build(
        mut self,
        builder_name: impl Into<String>,
        build_number: impl Into<String>,
    ) -> Self {
        self.builder_name = Some(builder_name.into());
        self.build_number = Some(build_number.into());
        self
    }

    pub fn with_buildbot_url(mut self, buildbot_url: impl Into<String>) -> Self {
        self.buildbot_url = buildbot_url.into();
        self
    }

    /// Link to the buildbot stdio log, empty without a builder name and number
    pub fn stdio_url(&self) -> String {
        let (Some(builder), Some(number)) = (
            self.builder_name.as_deref().filter(|b| !b.is_empty()),
            self.build_number.as_deref().filter(|n| !n.is_empty()),
        ) else {
            return String::new();
        };

        format!(
            "{}builders/{}/builds/{}/steps/{}/logs/stdio",
            self.buildbot_url,
            quote(builder),
            quote(number),
            quote(&self.test_name)
        )
    }

    fn stdio_uri_column(&self) -> Map<String, Value> {
        let url = self.stdio_url();
        if url.is_empty() {
            return Map::new();
        }
        link_column("stdio_uri", "Buildbot stdio", &url)
    }
}

fn quote(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Markdown link column rendered by the dashboard
fn link_column(name: &str, label: &str, url: &str) -> Map<String, Value> {
    let mut column = Map::new();
    column.insert(format!("a_{}", name), json!(format!("[{}]({})", label, url)));
    column
}

fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Point id and revision columns for one set of revision data.
///
/// The dashboard orders points by integer x-values. A `rev` that is not an
/// integer is taken to be a git hash; the point then gets the current UTC
/// timestamp as its id and the hash goes into the `chromium` column. An
/// explicit `point_id` always wins.
pub fn revision_number_columns(
    data: &Map<String, Value>,
    prefix: &str,
) -> AppResult<(i64, Map<String, Value>)> {
    let rev = data
        .get("rev")
        .ok_or_else(|| AppError::validation("rev", "Revision data must contain 'rev'"))?;

    let mut columns = Map::new();

    let mut revision = match parse_int(rev) {
        Some(revision) => {
            if COMMIT_POS_RANGE.contains(&revision) {
                columns.insert(format!("{}commit_pos", prefix), json!(revision));
            }
            revision
        }
        None => {
            columns.insert(format!("{}chromium", prefix), rev.clone());
            Utc::now().timestamp()
        }
    };

    if let Some(point_id) = data.get("point_id") {
        revision = parse_int(point_id)
            .ok_or_else(|| AppError::validation("point_id", "Must be an integer"))?;
    }

    for key in ["webrtc_git", "v8_rev"] {
        if let Some(value) = data.get(key).filter(|v| v.as_str() != Some("undefined")) {
            columns.insert(format!("{}{}", prefix, key), value.clone());
        }
    }

    if let Some(git_revision) = data
        .get("git_revision")
        .filter(|v| v.as_str() != Some("undefined"))
    {
        columns.insert(format!("{}chromium", prefix), git_revision.clone());
    }

    Ok((revision, columns))
}

/// Slash-separated dashboard test path, without master or bot.
///
/// `test/chart` is the main trace of a chart; `test/chart/trace` lines are
/// drawn on the same chart.
pub fn test_path(test_name: &str, chart_name: &str, trace_name: &str) -> String {
    let trace_name = if trace_name == format!("{}_ref", chart_name) {
        "ref".to_string()
    } else {
        trace_name.replace('/', "_")
    };
    let chart_name = chart_name.replace("_by_url", "");

    if chart_name == trace_name {
        format!("{}/{}", test_name, chart_name)
    } else {
        format!("{}/{}/{}", test_name, chart_name, trace_name)
    }
}

/// Builds the legacy `/add_point` payload: one point per chart trace, in
/// chart then trace name order.
///
/// Revision columns come from `revisions` when given, otherwise from each
/// chart's own data. Caller-supplied columns are applied last and override
/// the computed ones.
pub fn make_list_of_points(
    charts: &Map<String, Value>,
    revisions: Option<&Map<String, Value>>,
    supplemental_columns: &Map<String, Value>,
    build: &BuildContext,
) -> AppResult<Vec<Value>> {
    let mut chart_names: Vec<&String> = charts.keys().collect();
    chart_names.sort();

    let mut points = Vec::new();

    for chart_name in chart_names {
        let chart_data = charts[chart_name]
            .as_object()
            .ok_or_else(|| AppError::validation(chart_name, "Chart data must be an object"))?;

        let (point_id, revision_columns) =
            revision_number_columns(revisions.unwrap_or(chart_data), "r_")?;

        let traces = chart_data
            .get("traces")
            .and_then(Value::as_object)
            .ok_or_else(|| AppError::validation(chart_name, "Chart is missing 'traces'"))?;

        let important: Vec<&str> = chart_data
            .get("important")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let units = chart_data
            .get("units")
            .filter(|u| !u.is_null() && u.as_str() != Some(""));

        let mut trace_names: Vec<&String> = traces.keys().collect();
        trace_names.sort();

        for trace_name in trace_names {
            let values = traces[trace_name]
                .as_array()
                .filter(|values| values.len() >= 2)
                .ok_or_else(|| {
                    AppError::validation(trace_name, "Trace must hold a value and an error")
                })?;

            let mut supplemental = revision_columns.clone();
            supplemental.extend(build.stdio_uri_column());
            supplemental.extend(supplemental_columns.clone());

            let mut point = Map::new();
            point.insert("master".to_string(), json!(build.machine_group));
            point.insert("bot".to_string(), json!(build.bot));
            point.insert(
                "test".to_string(),
                json!(test_path(&build.test_name, chart_name, trace_name)),
            );
            point.insert("revision".to_string(), json!(point_id));
            point.insert("supplemental_columns".to_string(), Value::Object(supplemental));
            point.insert("value".to_string(), values[0].clone());
            point.insert("error".to_string(), values[1].clone());

            if let Some(units) = units {
                point.insert("units".to_string(), units.clone());
            }
            if important.contains(&trace_name.as_str()) {
                point.insert("important".to_string(), json!(true));
            }

            points.push(Value::Object(point));
        }
    }

    Ok(points)
}

/// Builds the dashboard JSON v1 payload wrapping raw telemetry chart JSON.
///
/// `r_` supplemental keys become versions and `a_` keys become annotations,
/// both with the prefix stripped.
pub fn make_dashboard_json_v1(
    chart_json: &Value,
    revisions: &Map<String, Value>,
    supplemental_dict: &Map<String, Value>,
    is_ref: bool,
    build: &BuildContext,
) -> AppResult<Value> {
    let is_empty = match chart_json {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if is_empty {
        log::error!("No json output from telemetry.");
    }

    let (point_id, mut versions) = revision_number_columns(revisions, "")?;

    let mut supplemental = Map::new();
    for (key, value) in supplemental_dict {
        if let Some(name) = key.strip_prefix("r_") {
            versions.insert(name.to_string(), value.clone());
        }
        if let Some(name) = key.strip_prefix("a_") {
            supplemental.insert(name.to_string(), value.clone());
        }
    }
    supplemental.extend(build.stdio_uri_column());

    // Reference runs report under the plain suite name.
    let test_name = build.test_name.replace(".reference", "");

    Ok(json!({
        "master": build.machine_group,
        "bot": build.bot,
        "test_suite_name": test_name,
        "point_id": point_id,
        "supplemental": supplemental,
        "versions": versions,
        "chart_data": chart_json,
        "is_ref": is_ref,
    }))
}
