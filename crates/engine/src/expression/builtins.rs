//! Built-in functions callable from capture expressions.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{EvaluationError, render_text};

static IPV4_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})\b").expect("valid IPv4 regex"));

static PORT_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,5})/(?:tcp|udp)\b|\bport\s+(\d{1,5})\b|:(\d{1,5})\b").expect("valid port regex")
});

const SCAN_SUCCESS_MARKERS: &[&str] = &["open", "host is up", "scan complete"];
const EXPLOIT_SUCCESS_MARKERS: &[&str] = &["access granted", "shell", "root", "exploit successful", "pwned"];
const FAILURE_MARKERS: &[&str] = &["failed", "error", "denied", "timeout", "unreachable", "host seems down"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ScanSuccess,
    ExploitSuccess,
    Contains,
    ExtractIp,
    ExtractPort,
    Wait,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "scan_success" => Some(Self::ScanSuccess),
            "exploit_success" => Some(Self::ExploitSuccess),
            "contains" => Some(Self::Contains),
            "extract_ip" => Some(Self::ExtractIp),
            "extract_port" => Some(Self::ExtractPort),
            "wait" => Some(Self::Wait),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ScanSuccess => "scan_success",
            Self::ExploitSuccess => "exploit_success",
            Self::Contains => "contains",
            Self::ExtractIp => "extract_ip",
            Self::ExtractPort => "extract_port",
            Self::Wait => "wait",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Contains => 2,
            _ => 1,
        }
    }

    /// Apply the function to already-evaluated arguments.
    ///
    /// `wait` does not sleep here; its clamped delay is added to `pending_wait`
    /// and the caller sleeps once evaluation finishes.
    pub fn apply(
        self,
        arguments: &[Value],
        pending_wait: &mut Duration,
        max_wait: Duration,
    ) -> Result<Value, EvaluationError> {
        let value = match self {
            Self::ScanSuccess => Value::Bool(reports_success(&render_text(&arguments[0]), SCAN_SUCCESS_MARKERS)),
            Self::ExploitSuccess => {
                Value::Bool(reports_success(&render_text(&arguments[0]), EXPLOIT_SUCCESS_MARKERS))
            }
            Self::Contains => {
                let haystack = render_text(&arguments[0]);
                let needle = render_text(&arguments[1]);
                Value::Bool(haystack.contains(needle.as_str()))
            }
            Self::ExtractIp => extract_ip(&render_text(&arguments[0])).map(Value::String).unwrap_or(Value::Null),
            Self::ExtractPort => extract_port(&render_text(&arguments[0])).map(Value::from).unwrap_or(Value::Null),
            Self::Wait => {
                let seconds = wait_seconds(&arguments[0])?;
                let delay = Duration::try_from_secs_f64(seconds.min(max_wait.as_secs_f64())).unwrap_or(max_wait);
                *pending_wait = (*pending_wait + delay).min(max_wait);
                Value::Bool(true)
            }
        };
        Ok(value)
    }
}

fn reports_success(text: &str, markers: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    markers.iter().any(|marker| lowered.contains(marker)) && !FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// First dotted quad in `text` whose octets are all within 0..=255.
pub fn extract_ip(text: &str) -> Option<String> {
    IPV4_CANDIDATE.captures_iter(text).find_map(|captures| {
        let valid = (1..=4).all(|group| captures[group].parse::<u16>().is_ok_and(|octet| octet <= 255));
        valid.then(|| captures[0].to_string())
    })
}

/// First port number in `N/tcp`, `N/udp`, `port N` or `:N` form within 1..=65535.
pub fn extract_port(text: &str) -> Option<u16> {
    PORT_CANDIDATE.captures_iter(text).find_map(|captures| {
        let digits = (1..=3).find_map(|group| captures.get(group))?;
        digits.as_str().parse::<u16>().ok().filter(|port| *port > 0)
    })
}

fn wait_seconds(argument: &Value) -> Result<f64, EvaluationError> {
    let seconds = match argument {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|seconds| seconds.is_finite())
    .ok_or_else(|| EvaluationError::InvalidArgument {
        function: "wait",
        message: format!("expected a number of seconds, got {}", super::type_name(argument)),
    })?;
    Ok(seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_ip_skips_out_of_range_octets() {
        assert_eq!(extract_ip("bad 999.1.1.1 then 10.0.0.5 up"), Some("10.0.0.5".to_string()));
        assert_eq!(extract_ip("no address here"), None);
        assert_eq!(extract_ip("256.256.256.256"), None);
    }

    #[test]
    fn extract_port_understands_common_forms() {
        assert_eq!(extract_port("22/tcp open ssh"), Some(22));
        assert_eq!(extract_port("listening on port 8080"), Some(8080));
        assert_eq!(extract_port("connected to 10.0.0.5:443"), Some(443));
        assert_eq!(extract_port("99999/tcp"), None);
        assert_eq!(extract_port("nothing"), None);
    }

    #[test]
    fn scan_success_requires_positive_marker_without_failure() {
        assert!(reports_success("22/tcp open ssh", SCAN_SUCCESS_MARKERS));
        assert!(!reports_success("Host seems down", SCAN_SUCCESS_MARKERS));
        assert!(!reports_success("open failed: connection error", SCAN_SUCCESS_MARKERS));
        assert!(!reports_success("all ports filtered", SCAN_SUCCESS_MARKERS));
    }

    #[test]
    fn exploit_success_detects_shell() {
        assert!(reports_success("Exploit successful, root shell obtained", EXPLOIT_SUCCESS_MARKERS));
        assert!(!reports_success("Access denied", EXPLOIT_SUCCESS_MARKERS));
    }

    #[test]
    fn wait_accumulates_clamped_delay() {
        let mut pending = Duration::ZERO;
        let max = Duration::from_secs(2);
        let result = Builtin::Wait.apply(&[json!(5)], &mut pending, max).unwrap();
        assert_eq!(result, Value::Bool(true));
        assert_eq!(pending, max);

        let error = Builtin::Wait.apply(&[json!({"a": 1})], &mut pending, max).unwrap_err();
        assert!(matches!(error, EvaluationError::InvalidArgument { function: "wait", .. }));
    }

    #[test]
    fn wait_clamps_delays_beyond_duration_range() {
        let max = Duration::from_secs(3);
        for argument in [json!(1e30), json!("99999999999999999999999"), json!(f64::MAX)] {
            let mut pending = Duration::ZERO;
            let result = Builtin::Wait.apply(&[argument], &mut pending, max).unwrap();
            assert_eq!(result, Value::Bool(true));
            assert_eq!(pending, max);
        }
    }
}
