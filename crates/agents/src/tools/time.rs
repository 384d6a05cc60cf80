//! Current time, offsets and zone conversion via chrono-tz.

use async_trait::async_trait;
use buddy_common::{BuddyError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};

use super::{Tool, ToolOutput, ToolRequest};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub struct TimeTool;

fn parse_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| BuddyError::Tool(format!("unknown timezone '{name}'")))
}

/// RFC 3339 timestamps keep their offset; naive timestamps are read as
/// wall-clock time in `zone`.
fn parse_time(input: &str, zone: Tz) -> Result<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&zone));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| BuddyError::Tool(format!("cannot parse time '{input}'")))?;
    zone.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| BuddyError::Tool(format!("'{input}' does not exist in {zone}")))
}

fn amount_arg(arguments: &Value) -> Result<i64> {
    match arguments.get("amount") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| BuddyError::Tool("amount must be an integer".into())),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| BuddyError::Tool(format!("amount '{s}' is not an integer"))),
        _ => Err(BuddyError::Tool("missing argument 'amount'".into())),
    }
}

fn duration_for(amount: i64, unit: &str) -> Result<Duration> {
    let duration = match unit {
        "seconds" | "second" => Duration::try_seconds(amount),
        "minutes" | "minute" => Duration::try_minutes(amount),
        "hours" | "hour" => Duration::try_hours(amount),
        "days" | "day" => Duration::try_days(amount),
        "weeks" | "week" => Duration::try_weeks(amount),
        other => return Err(BuddyError::Tool(format!("unknown unit '{other}'"))),
    };
    duration.ok_or_else(|| BuddyError::Tool(format!("{amount} {unit} is out of range")))
}

impl TimeTool {
    /// Current time in `timezone`; unknown zones fall back to UTC with a warning.
    pub fn now(&self, timezone: Option<&str>) -> Value {
        let requested = timezone.unwrap_or("UTC");
        let (zone, warning) = match parse_zone(requested) {
            Ok(zone) => (zone, None),
            Err(_) => (Tz::UTC, Some(format!("unknown timezone '{requested}', using UTC"))),
        };
        let now = Utc::now().with_timezone(&zone);
        let mut out = json!({
            "time": now.format(DISPLAY_FORMAT).to_string(),
            "timezone": zone.name(),
            "iso": now.to_rfc3339(),
            "unix": now.timestamp(),
        });
        if let Some(warning) = warning {
            out["warning"] = json!(warning);
        }
        out
    }

    fn add(&self, request: &ToolRequest) -> Result<Value> {
        let zone = parse_zone(request.str_arg("timezone").unwrap_or("UTC"))?;
        let base = match request.str_arg("time") {
            Some(time) => parse_time(time, zone)?,
            None => Utc::now().with_timezone(&zone),
        };
        let amount = amount_arg(&request.arguments)?;
        let unit = request.str_arg("unit").unwrap_or("hours");
        let result = base
            .checked_add_signed(duration_for(amount, unit)?)
            .ok_or_else(|| BuddyError::Tool("resulting time is out of range".into()))?;
        Ok(json!({
            "original": base.format(DISPLAY_FORMAT).to_string(),
            "result": result.format(DISPLAY_FORMAT).to_string(),
            "added": format!("{amount} {unit}"),
        }))
    }

    fn convert(&self, request: &ToolRequest) -> Result<Value> {
        let from = parse_zone(request.required_str("from_timezone")?)?;
        let to = parse_zone(request.required_str("to_timezone")?)?;
        let original = parse_time(request.required_str("time")?, from)?;
        let converted = original.with_timezone(&to);
        Ok(json!({
            "original": original.format(DISPLAY_FORMAT).to_string(),
            "converted": converted.format(DISPLAY_FORMAT).to_string(),
            "from_timezone": from.name(),
            "to_timezone": to.name(),
        }))
    }
}

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &'static str {
        "time"
    }

    fn description(&self) -> &'static str {
        "Current time, time arithmetic and timezone conversion"
    }

    fn actions(&self) -> &'static [&'static str] {
        &["now", "add", "convert"]
    }

    fn max_args(&self) -> usize {
        7
    }

    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let output = match request.action.as_str() {
            "now" => self.now(request.str_arg("timezone")),
            "add" => self.add(request)?,
            _ => self.convert(request)?,
        };
        Ok(ToolOutput::new(self.name(), &request.action, output))
    }
}
