// ABOUTME: Trace file name parsing via configurable regular expressions
// ABOUTME: Extracts gene, plate/well or sample ID, and the reverse-read marker

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{Result, SampleError};

pub const DEFAULT_TRACE_PATTERN: &str =
    r"^(?P<plate>[A-Za-z0-9.-]+)_(?P<gene>[A-Za-z0-9.-]+)_(?P<well>[A-Ha-h]\d{1,2})";
pub const DEFAULT_REVERSE_PATTERN: &str = r"_[Rr](?:ev)?(?:[_.]|$)";

/// Regex settings as they appear in the YAML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "default_trace_pattern")]
    pub trace_pattern: String,
    #[serde(default = "default_reverse_pattern")]
    pub reverse_pattern: String,
}

fn default_trace_pattern() -> String {
    DEFAULT_TRACE_PATTERN.to_string()
}

fn default_reverse_pattern() -> String {
    DEFAULT_REVERSE_PATTERN.to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            trace_pattern: default_trace_pattern(),
            reverse_pattern: default_reverse_pattern(),
        }
    }
}

/// A well coordinate on a 96-well plate: row letter A-H, column 1-12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Well {
    pub row: u8,
    pub col: u8,
}

impl Well {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || SampleError::InvalidWell {
            well: text.to_string(),
        };
        let mut chars = text.chars();
        let row_char = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        if !('A'..='H').contains(&row_char) {
            return Err(invalid());
        }
        let col: u8 = chars.as_str().parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&col) {
            return Err(invalid());
        }
        Ok(Self {
            row: row_char as u8 - b'A',
            col: col - 1,
        })
    }
}

impl std::fmt::Display for Well {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02}", (b'A' + self.row) as char, self.col + 1)
    }
}

/// What a trace file name resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceName {
    pub gene: String,
    pub locator: Locator,
    pub is_reverse: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Locator {
    /// Plate id + well coordinate, resolved through a plate layout CSV.
    Well { plate: String, well: Well },
    /// Direct sample ID captured from the file name.
    Sample(String),
}

/// Compiled naming rules applied to every discovered trace file.
#[derive(Debug, Clone)]
pub struct NamingRules {
    trace_re: Regex,
    reverse_re: Regex,
}

impl NamingRules {
    pub fn from_config(config: &NamingConfig) -> Result<Self> {
        let trace_re = compile(&config.trace_pattern)?;
        let reverse_re = compile(&config.reverse_pattern)?;

        let names: Vec<_> = trace_re.capture_names().flatten().collect();
        let has_gene = names.contains(&"gene");
        let has_sample = names.contains(&"sample");
        let has_plate_well = names.contains(&"plate") && names.contains(&"well");
        if !has_gene || !(has_sample || has_plate_well) {
            return Err(SampleError::MissingCaptures {
                pattern: config.trace_pattern.clone(),
            });
        }

        Ok(Self {
            trace_re,
            reverse_re,
        })
    }

    /// Parse a trace file stem. Returns None when the name does not
    /// match the trace pattern at all; such files are skipped upstream.
    pub fn parse(&self, stem: &str) -> Result<Option<TraceName>> {
        let captures = match self.trace_re.captures(stem) {
            Some(captures) => captures,
            None => return Ok(None),
        };

        let gene = match captures.name("gene") {
            Some(m) => m.as_str().to_string(),
            None => return Ok(None),
        };

        let locator = if let Some(sample) = captures.name("sample") {
            Locator::Sample(sample.as_str().to_string())
        } else {
            let plate = captures
                .name("plate")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let well = match captures.name("well") {
                Some(m) => Well::parse(m.as_str())?,
                None => return Ok(None),
            };
            Locator::Well { plate, well }
        };

        Ok(Some(TraceName {
            gene,
            locator,
            is_reverse: self.reverse_re.is_match(stem),
        }))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SampleError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_rules() -> NamingRules {
        NamingRules::from_config(&NamingConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_plate_well_name() {
        let rules = default_rules();
        let name = rules.parse("D15_ITS1F_A01").unwrap().unwrap();

        assert_eq!(name.gene, "ITS1F");
        assert_eq!(
            name.locator,
            Locator::Well {
                plate: "D15".to_string(),
                well: Well { row: 0, col: 0 },
            }
        );
        assert!(!name.is_reverse);
    }

    #[test]
    fn test_reverse_marker() {
        let rules = default_rules();
        let name = rules.parse("D15_OPA10_B02_R").unwrap().unwrap();
        assert!(name.is_reverse);

        let name = rules.parse("D15_OPA10_B02_Rev").unwrap().unwrap();
        assert!(name.is_reverse);
    }

    #[test]
    fn test_non_matching_name_is_skipped() {
        let rules = default_rules();
        assert!(rules.parse("random-noise").unwrap().is_none());
    }

    #[test]
    fn test_sample_capture_pattern() {
        let config = NamingConfig {
            trace_pattern: r"^(?P<sample>[A-Za-z0-9-]+)__(?P<gene>[A-Za-z0-9]+)".to_string(),
            reverse_pattern: DEFAULT_REVERSE_PATTERN.to_string(),
        };
        let rules = NamingRules::from_config(&config).unwrap();
        let name = rules.parse("isolate-77__cpn60").unwrap().unwrap();

        assert_eq!(name.gene, "cpn60");
        assert_eq!(name.locator, Locator::Sample("isolate-77".to_string()));
    }

    #[test]
    fn test_pattern_must_name_required_groups() {
        let config = NamingConfig {
            trace_pattern: r"^(?P<gene>\w+)".to_string(),
            reverse_pattern: DEFAULT_REVERSE_PATTERN.to_string(),
        };
        assert!(matches!(
            NamingRules::from_config(&config),
            Err(SampleError::MissingCaptures { .. })
        ));
    }

    #[test]
    fn test_well_parsing_bounds() {
        assert_eq!(Well::parse("A1").unwrap(), Well { row: 0, col: 0 });
        assert_eq!(Well::parse("H12").unwrap(), Well { row: 7, col: 11 });
        assert_eq!(Well::parse("b04").unwrap().to_string(), "B04");
        assert!(Well::parse("I01").is_err());
        assert!(Well::parse("A13").is_err());
        assert!(Well::parse("A0").is_err());
    }
}
