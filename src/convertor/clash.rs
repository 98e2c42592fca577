//! Clash rule-provider payload format.
//!
//! ```yaml
//! payload:
//!   - DOMAIN-SUFFIX,google.com
//!   - AND,((NETWORK,UDP),(DST-PORT,443))
//! ```

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{prepare, ConvertOptions, Convertor};
use crate::behavior::Behavior;
use crate::mrs::rule_from_domain_keys;
use crate::rule::{DefaultRule, LogicalMode, LogicalRule, Rule};
use crate::Result;

#[derive(Debug, Default, Deserialize)]
struct PayloadIn {
    #[serde(default)]
    payload: Vec<serde_yaml::Value>,
}

#[derive(Debug, Serialize)]
struct PayloadOut {
    payload: Vec<String>,
}

/// Rule-provider payloads; behavior defaults to classical.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClashConvertor;

/// Payload entries as trimmed strings, skipping blanks and comments.
fn payload_lines(content: &[u8]) -> Result<Vec<String>> {
    let payload: PayloadIn = serde_yaml::from_slice(content)?;
    Ok(payload
        .payload
        .into_iter()
        .filter_map(|value| match value {
            serde_yaml::Value::String(s) => Some(s),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            other => {
                debug!("Skipping non-scalar payload entry: {:?}", other);
                None
            }
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect())
}

fn push_port(ports: &mut Vec<u16>, ranges: &mut Vec<String>, value: &str) -> bool {
    if let Ok(port) = value.parse::<u16>() {
        ports.push(port);
        return true;
    }
    match value.split_once(['-', ':']) {
        Some((start, end)) if start.parse::<u16>().is_ok() && end.parse::<u16>().is_ok() => {
            ranges.push(format!("{start}:{end}"));
            true
        }
        _ => false,
    }
}

/// Parse a single-condition line such as `DOMAIN-SUFFIX,google.com`.
fn parse_simple(kind: &str, rest: &str) -> Option<Rule> {
    // trailing fields are flags such as no-resolve
    let value = rest.split(',').next().unwrap_or_default().trim();
    if value.is_empty() {
        return None;
    }
    let value_owned = value.to_string();

    let mut rule = DefaultRule::new();
    let parsed = match kind {
        "DOMAIN" => {
            rule.domain.push(value_owned);
            true
        }
        "DOMAIN-SUFFIX" => {
            rule.domain_suffix.push(value_owned);
            true
        }
        "DOMAIN-KEYWORD" => {
            rule.domain_keyword.push(value_owned);
            true
        }
        "DOMAIN-REGEX" => {
            rule.domain_regex.push(value_owned);
            true
        }
        "IP-CIDR" | "IP-CIDR6" => {
            rule.ip_cidr.push(value_owned);
            true
        }
        "SRC-IP-CIDR" => {
            rule.source_ip_cidr.push(value_owned);
            true
        }
        "IP-ASN" => {
            rule.ip_asn.push(value_owned);
            true
        }
        "SRC-IP-ASN" => {
            rule.source_ip_asn.push(value_owned);
            true
        }
        "DST-PORT" => push_port(&mut rule.port, &mut rule.port_range, value),
        "SRC-PORT" => push_port(&mut rule.source_port, &mut rule.source_port_range, value),
        "PROCESS-NAME" => {
            rule.process_name.push(value_owned);
            true
        }
        "PROCESS-PATH" => {
            rule.process_path.push(value_owned);
            true
        }
        "NETWORK" => {
            rule.network.push(value.to_ascii_lowercase());
            true
        }
        _ => {
            debug!("Skipping unsupported Clash rule type: {}", kind);
            false
        }
    };
    parsed.then_some(Rule::Default(rule))
}

/// Split `(A),(B,(C))` into `A` and `B,(C)` at top-level commas.
fn split_operands(inner: &str) -> Option<Vec<&str>> {
    let mut operands = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (index, ch) in inner.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = Some(index + 1);
                }
                depth += 1;
            }
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    operands.push(inner[start?..index].trim());
                    start = None;
                }
            }
            ',' | ' ' if depth == 0 => {}
            _ if depth == 0 => return None,
            _ => {}
        }
    }
    (depth == 0).then_some(operands)
}

/// Parse `AND,((...),(...))`, `OR,(...)` or `NOT,((...))`.
fn parse_logical(kind: &str, rest: &str) -> Option<Rule> {
    let rest = rest.trim();
    let close = matching_close(rest)?;
    let inner = &rest[1..close];
    let mut children = Vec::new();
    for operand in split_operands(inner)? {
        children.push(parse_expression(operand)?);
    }
    if children.is_empty() {
        return None;
    }

    let rule = match kind {
        "AND" => LogicalRule::new(LogicalMode::And, children),
        "OR" => LogicalRule::new(LogicalMode::Or, children),
        _ if children.len() == 1 => LogicalRule::not(children.remove(0)),
        _ => return None,
    };
    Some(Rule::Logical(rule))
}

/// Index of the parenthesis closing the one at `s[0]`.
fn matching_close(s: &str) -> Option<usize> {
    if !s.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    for (index, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse one classical expression: a simple or a logical condition.
fn parse_expression(line: &str) -> Option<Rule> {
    let (kind, rest) = line.split_once(',')?;
    let kind = kind.trim().to_ascii_uppercase();
    match kind.as_str() {
        "AND" | "OR" | "NOT" => parse_logical(&kind, rest),
        _ => parse_simple(&kind, rest),
    }
}

fn format_port_range(range: &str) -> String {
    range.replacen(':', "-", 1)
}

fn tagged<'a>(kind: &'a str, values: &'a [String]) -> impl Iterator<Item = String> + 'a {
    values.iter().map(move |value| format!("{kind},{value}"))
}

fn port_items(kind: &str, ports: &[u16], ranges: &[String]) -> Vec<String> {
    ports
        .iter()
        .map(u16::to_string)
        .chain(ranges.iter().map(|r| format_port_range(r)))
        .map(|value| format!("{kind},{value}"))
        .collect()
}

/// First populated field a classical payload has no rule type for.
fn unexpressible_field(rule: &DefaultRule) -> Option<&str> {
    let flagged = [
        ("package_name", !rule.package_name.is_empty()),
        ("network_type", !rule.network_type.is_empty()),
        ("network_is_expensive", rule.network_is_expensive),
        ("network_is_constrained", rule.network_is_constrained),
        ("wifi_ssid", !rule.wifi_ssid.is_empty()),
        ("wifi_bssid", !rule.wifi_bssid.is_empty()),
        ("rule_set", !rule.rule_set.is_empty()),
    ]
    .into_iter()
    .find(|(_, set)| *set);
    if let Some((name, _)) = flagged {
        return Some(name);
    }
    rule.extra.keys().next().map(String::as_str)
}

fn expressible(rule: &DefaultRule) -> bool {
    match unexpressible_field(rule) {
        Some(field) => {
            debug!("Skipping rule with {} condition, not expressible in Clash", field);
            false
        }
        None => true,
    }
}

/// Conditions of a default rule as `TYPE,value` items, grouped.
///
/// Items of one group match if any of them does; a rule matches only if
/// every non-empty group does.
fn rule_groups(rule: &DefaultRule) -> Vec<Vec<String>> {
    let networks: Vec<String> = rule.network.iter().map(|n| n.to_ascii_uppercase()).collect();
    let groups: Vec<Vec<String>> = vec![
        tagged("DOMAIN", &rule.domain)
            .chain(tagged("DOMAIN-SUFFIX", &rule.domain_suffix))
            .chain(tagged("DOMAIN-KEYWORD", &rule.domain_keyword))
            .chain(tagged("DOMAIN-REGEX", &rule.domain_regex))
            .chain(tagged("IP-CIDR", &rule.ip_cidr))
            .chain(tagged("IP-ASN", &rule.ip_asn))
            .collect(),
        tagged("SRC-IP-CIDR", &rule.source_ip_cidr)
            .chain(tagged("SRC-IP-ASN", &rule.source_ip_asn))
            .collect(),
        port_items("DST-PORT", &rule.port, &rule.port_range),
        port_items("SRC-PORT", &rule.source_port, &rule.source_port_range),
        tagged("PROCESS-NAME", &rule.process_name)
            .chain(tagged("PROCESS-PATH", &rule.process_path))
            .collect(),
        tagged("NETWORK", &networks).collect(),
    ];
    groups.into_iter().filter(|group| !group.is_empty()).collect()
}

fn wrap(operator: &str, operands: &[String]) -> String {
    let inner: Vec<String> = operands.iter().map(|o| format!("({o})")).collect();
    format!("{operator},({})", inner.join(","))
}

fn invert(expression: String, inverted: bool) -> String {
    if inverted {
        wrap("NOT", &[expression])
    } else {
        expression
    }
}

/// AND across groups, OR within a group.
fn grouped_expression(groups: Vec<Vec<String>>) -> Option<String> {
    let mut operands: Vec<String> = groups
        .into_iter()
        .map(|mut group| {
            if group.len() == 1 {
                group.remove(0)
            } else {
                wrap("OR", &group)
            }
        })
        .collect();
    match operands.len() {
        0 => None,
        1 => Some(operands.remove(0)),
        _ => Some(wrap("AND", &operands)),
    }
}

/// Render a rule as one classical expression. `None` if any part of it
/// cannot be expressed.
fn expression(rule: &Rule) -> Option<String> {
    match rule {
        Rule::Default(default) => {
            if !expressible(default) {
                return None;
            }
            grouped_expression(rule_groups(default)).map(|e| invert(e, default.invert))
        }
        Rule::Logical(logical) => {
            let children = logical
                .rules
                .iter()
                .map(expression)
                .collect::<Option<Vec<String>>>()?;
            if children.is_empty() {
                return None;
            }
            let operator = match logical.mode {
                LogicalMode::And => "AND",
                LogicalMode::Or => "OR",
            };
            Some(invert(wrap(operator, &children), logical.invert))
        }
    }
}

/// Classical payload lines. A plain default rule with a single condition
/// group contributes one line per item.
fn classical_lines(rules: &[Rule]) -> Vec<String> {
    let mut lines = Vec::new();
    for rule in rules {
        match rule {
            Rule::Default(default) if !default.invert => {
                if !expressible(default) {
                    continue;
                }
                let mut groups = rule_groups(default);
                if groups.len() == 1 {
                    lines.append(&mut groups[0]);
                } else {
                    lines.extend(grouped_expression(groups));
                }
            }
            _ => lines.extend(expression(rule)),
        }
    }
    lines
}

fn domain_lines(rules: &[Rule]) -> Vec<String> {
    rules
        .iter()
        .filter_map(Rule::as_default)
        .filter(|rule| rule.is_destination_address_rule())
        .flat_map(|rule| {
            let exact = rule.domain.iter().cloned();
            let suffix = rule.domain_suffix.iter().map(|suffix| {
                if suffix.starts_with('.') {
                    suffix.clone()
                } else {
                    format!("+.{suffix}")
                }
            });
            exact.chain(suffix)
        })
        .collect()
}

fn ipcidr_lines(rules: &[Rule]) -> Vec<String> {
    rules
        .iter()
        .filter_map(Rule::as_default)
        .filter(|rule| rule.is_destination_address_rule())
        .flat_map(|rule| rule.ip_cidr.iter().cloned())
        .collect()
}

#[async_trait]
impl Convertor for ClashConvertor {
    fn format_id(&self) -> &'static str {
        "clash"
    }

    fn content_type(&self, _options: &ConvertOptions) -> &'static str {
        "text/yaml"
    }

    fn from_bytes(&self, content: &[u8], options: &ConvertOptions) -> Result<Vec<Rule>> {
        let lines = payload_lines(content)?;
        let rules = match options.behavior.unwrap_or(Behavior::Classical) {
            Behavior::Domain => {
                let keys = lines.iter().map(|line| line.to_lowercase()).collect();
                single_rule(rule_from_domain_keys(keys))
            }
            Behavior::IpCidr => single_rule(DefaultRule {
                ip_cidr: lines,
                ..Default::default()
            }),
            Behavior::Classical => lines
                .iter()
                .filter_map(|line| {
                    let rule = parse_expression(line);
                    if rule.is_none() {
                        debug!("Skipping unparsable Clash rule: {}", line);
                    }
                    rule
                })
                .collect(),
        };
        Ok(rules)
    }

    async fn to_bytes(&self, rules: Vec<Rule>, options: &ConvertOptions) -> Result<Vec<u8>> {
        let rule_set = prepare(rules, options).await?;
        let payload = match options.behavior.unwrap_or(Behavior::Classical) {
            Behavior::Domain => domain_lines(&rule_set.rules),
            Behavior::IpCidr => ipcidr_lines(&rule_set.rules),
            Behavior::Classical => classical_lines(&rule_set.rules),
        };
        Ok(serde_yaml::to_string(&PayloadOut { payload })?.into_bytes())
    }
}

fn single_rule(rule: DefaultRule) -> Vec<Rule> {
    if rule.is_empty() {
        Vec::new()
    } else {
        vec![Rule::Default(rule)]
    }
}
