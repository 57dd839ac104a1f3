use crate::error::ParseError;
use flap_types::{Attributes, EventType, RawEvent};
use regex::Regex;
use std::sync::LazyLock;

/// `<ts> {pid=.. tid=.. proc=..} {ENTER|EXIT <operand>} {<key=value ...>}`
///
/// Anchored at the start only; anything after the attribute block is ignored.
static EVENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<timestamp>\d+)\s+\{\s*pid=(?P<pid>\d+)\s+tid=(?P<tid>\d+)\s+proc=(?P<proc>\S+)\s*\}\s+\{\s*(?P<etype>ENTER|EXIT)\s+(?P<operand>\S+)\s*\}\s+\{\s*(?P<kv>.*?)\s*\}",
    )
    .unwrap()
});

/// Parse one raw tracer line
pub fn parse_line(line: &str) -> Result<RawEvent, ParseError> {
    let caps = EVENT_REGEX.captures(line).ok_or(ParseError::NoMatch)?;

    let timestamp_ns = parse_number(&caps["timestamp"], "timestamp")?;
    let pid = parse_number(&caps["pid"], "pid")?;
    let tid = parse_number(&caps["tid"], "tid")?;
    let event_type = EventType::parse(&caps["etype"]).ok_or(ParseError::NoMatch)?;

    Ok(RawEvent {
        timestamp_ns,
        pid,
        tid,
        proc_name: caps["proc"].to_string(),
        event_type,
        operand: caps["operand"].to_string(),
        attributes: parse_attributes(&caps["kv"]),
    })
}

fn parse_number<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Split an attribute block on whitespace, then each token on its first `=`
///
/// Tokens without `=` are skipped; a repeated key keeps the last value.
pub fn parse_attributes(block: &str) -> Attributes {
    block
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_line() {
        let event = parse_line("100 {pid=5 tid=5 proc=foo} {ENTER read} {fd=3}").unwrap();

        assert_eq!(event.timestamp_ns, 100);
        assert_eq!(event.pid, 5);
        assert_eq!(event.tid, 5);
        assert_eq!(event.proc_name, "foo");
        assert_eq!(event.event_type, EventType::Enter);
        assert_eq!(event.operand, "read");
        assert_eq!(event.attributes.get("fd"), Some("3"));
    }

    #[test]
    fn test_parse_tolerates_padding() {
        let line = "  618552580474815   {  pid=10 tid=11 proc=python3.11 }  { EXIT openat }  {  fname=/etc/hosts ret=3  } trailing";
        let event = parse_line(line).unwrap();

        assert_eq!(event.timestamp_ns, 618552580474815);
        assert_eq!(event.proc_name, "python3.11");
        assert_eq!(event.event_type, EventType::Exit);
        let pairs: Vec<_> = event.attributes.iter().collect();
        assert_eq!(pairs, vec![("fname", "/etc/hosts"), ("ret", "3")]);
    }

    #[test]
    fn test_empty_attribute_block() {
        let event = parse_line("1 {pid=0 tid=0 proc=swapper} {EXIT idle} {}").unwrap();
        assert!(event.attributes.is_empty());
    }

    #[test]
    fn test_attribute_tokens() {
        let attrs = parse_attributes("fd=3 flag noeq= a=b=c fd=4");
        let pairs: Vec<_> = attrs.iter().collect();
        assert_eq!(pairs, vec![("fd", "4"), ("noeq", ""), ("a", "b=c")]);
    }

    #[test]
    fn test_non_matching_lines() {
        for line in [
            "",
            "Attaching 12 probes...",
            "100 {pid=5 tid=5 proc=foo} {OPEN read} {fd=3}",
            "100 {pid=5 tid=5} {ENTER read} {fd=3}",
            "abc {pid=5 tid=5 proc=foo} {ENTER read} {fd=3}",
            "100 {pid=5 tid=5 proc=foo} {ENTER read}",
        ] {
            assert_eq!(parse_line(line), Err(ParseError::NoMatch), "{:?}", line);
        }
    }

    #[test]
    fn test_out_of_range_pid() {
        let err = parse_line("1 {pid=99999999999 tid=1 proc=x} {ENTER read} {}").unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { field: "pid", .. }));
    }
}
