//! Setup file codec.
//!
//! A setup file is one comma-joined line:
//!
//! ```text
//! <48 fingerprint tokens>,<per present plate: all labels, then all states>,<count>,<period>
//! ```
//!
//! Fingerprint tokens are the address digit for a present slot and `X` otherwise,
//! in canonical slot order. Loading validates the whole document against the live
//! registry before anything is changed.

use crate::acquisition::session::is_valid_period;
use crate::error::{AppResult, PlateError};
use crate::registry::Registry;
use std::path::Path;
use tracing::{info, warn};

/// Token separator.
pub const DELIMITER: char = ',';

/// Parsed setup file, checked against a registry but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupDocument {
    /// Labels and states per present plate, canonical order
    pub modules: Vec<ModuleSetup>,
    /// Samples per session
    pub sample_count: u32,
    /// Seconds between samples
    pub sample_period: f64,
}

/// Labels and states of one plate.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSetup {
    /// One label per channel
    pub labels: Vec<String>,
    /// One state token per channel
    pub states: Vec<String>,
}

impl SetupDocument {
    /// Copy labels and states onto the registry's plates.
    pub fn apply(&self, registry: &mut Registry) {
        for (module, setup) in registry.modules_mut().zip(&self.modules) {
            module.apply(setup.labels.as_slice(), setup.states.as_slice());
        }
    }
}

fn is_unsafe_label(label: &str) -> bool {
    label.contains([DELIMITER, '\r', '\n'])
}

/// Render the registry and acquisition settings as setup file text.
///
/// Fails with [`PlateError::UnsafeLabel`] if a label could not be read back aligned.
pub fn encode(registry: &Registry, sample_count: u32, sample_period: f64) -> AppResult<String> {
    let mut tokens = registry.fingerprint();

    for module in registry.modules() {
        for (index, label) in module.labels().into_iter().enumerate() {
            if is_unsafe_label(label) {
                return Err(PlateError::UnsafeLabel {
                    channel: format!("{module} channel {index}"),
                    label: label.to_string(),
                });
            }
            tokens.push(label.to_string());
        }
        tokens.extend(module.states().into_iter().map(str::to_string));
    }

    tokens.push(sample_count.to_string());
    tokens.push(sample_period.to_string());

    let mut text = tokens.join(&DELIMITER.to_string());
    text.push('\n');
    Ok(text)
}

/// Parse setup file text against the registry's current hardware.
///
/// Nothing is mutated here; a fingerprint mismatch, wrong token count or bad numeric
/// field is reported as an error.
pub fn decode(text: &str, registry: &Registry) -> AppResult<SetupDocument> {
    let line = text.trim_end_matches(['\r', '\n']);
    let tokens: Vec<&str> = line.split(DELIMITER).collect();

    let expected = registry.fingerprint();
    let found: Vec<String> = tokens
        .iter()
        .take(expected.len())
        .map(|t| t.to_string())
        .collect();
    if found != expected {
        return Err(PlateError::HardwareMismatch { expected, found });
    }

    let channel_tokens: usize = registry.modules().map(|m| 2 * m.channels().len()).sum();
    let required = expected.len() + channel_tokens + 2;
    if tokens.len() != required {
        return Err(PlateError::SetupFormat(format!(
            "expected {required} fields, found {}",
            tokens.len()
        )));
    }

    let mut cursor = expected.len();
    let mut modules = Vec::new();
    for module in registry.modules() {
        let n = module.channels().len();
        let labels = tokens[cursor..cursor + n].iter().map(|t| t.to_string()).collect();
        let states = tokens[cursor + n..cursor + 2 * n]
            .iter()
            .map(|t| t.to_string())
            .collect();
        modules.push(ModuleSetup { labels, states });
        cursor += 2 * n;
    }

    let count_token = tokens[cursor];
    let period_token = tokens[cursor + 1];
    let sample_count = count_token
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| PlateError::SetupFormat(format!("invalid sample count '{count_token}'")))?;
    let sample_period = period_token
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| is_valid_period(*p))
        .ok_or_else(|| {
            PlateError::SetupFormat(format!("invalid sample period '{period_token}'"))
        })?;

    Ok(SetupDocument {
        modules,
        sample_count,
        sample_period,
    })
}

/// Write the setup file.
pub fn save(
    path: impl AsRef<Path>,
    registry: &Registry,
    sample_count: u32,
    sample_period: f64,
) -> AppResult<()> {
    let text = encode(registry, sample_count, sample_period)?;
    std::fs::write(path.as_ref(), text)?;
    info!(path = %path.as_ref().display(), "Setup saved");
    Ok(())
}

/// Read a setup file, apply it to the registry and return the document.
///
/// On any error the registry is left untouched.
pub fn load(path: impl AsRef<Path>, registry: &mut Registry) -> AppResult<SetupDocument> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let document = decode(&text, registry).inspect_err(|err| {
        warn!(path = %path.as_ref().display(), error = %err, "Setup not applied");
    })?;
    document.apply(registry);
    info!(path = %path.as_ref().display(), "Setup loaded");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate::{Module, PlateFamily};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.insert(Module::new(PlateFamily::Daqc2, 0, 4));
        registry.insert(Module::new(PlateFamily::Thermo, 2, 4));
        registry
    }

    #[test]
    fn test_encode_layout() {
        let mut registry = registry();
        registry
            .module_mut(PlateFamily::Thermo, 2)
            .unwrap()
            .channel_mut(1)
            .unwrap()
            .set_enabled(true);

        let text = encode(&registry, 3, 0.5).unwrap();
        assert!(text.ends_with(",3,0.5\n"));

        let tokens: Vec<&str> = text.trim_end().split(',').collect();
        assert_eq!(tokens.len(), 48 + 32 + 24 + 2);
        assert_eq!(tokens[0], "0");
        assert_eq!(tokens[1], "X");
        assert_eq!(tokens[18], "2");
        // DAQC2 labels then states
        assert_eq!(tokens[48], "A Channel 0:");
        assert_eq!(tokens[48 + 15], "D Channel 7:");
        assert_eq!(tokens[48 + 16], "0");
        // THERMO labels then states
        assert_eq!(tokens[80], "T Channel 1:");
        assert_eq!(tokens[80 + 12], "0");
        assert_eq!(tokens[80 + 13], "1");
    }

    #[test]
    fn test_encode_rejects_comma_label() {
        let mut registry = registry();
        registry
            .module_mut(PlateFamily::Daqc2, 0)
            .unwrap()
            .channel_mut(2)
            .unwrap()
            .set_label("flow, inlet");

        match encode(&registry, 10, 1.0).unwrap_err() {
            PlateError::UnsafeLabel { channel, label } => {
                assert_eq!(channel, "DAQC2-0 channel 2");
                assert_eq!(label, "flow, inlet");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let mut source = registry();
        {
            let module = source.module_mut(PlateFamily::Daqc2, 0).unwrap();
            module.channel_mut(0).unwrap().set_label("pressure");
            module.channel_mut(0).unwrap().set_enabled(true);
            module.channel_mut(12).unwrap().set_enabled(true);
        }
        let text = encode(&source, 250, 0.75).unwrap();

        let mut target = registry();
        let document = decode(&text, &target).unwrap();
        assert_eq!(document.sample_count, 250);
        assert_eq!(document.sample_period, 0.75);
        document.apply(&mut target);

        for (a, b) in source.modules().zip(target.modules()) {
            assert_eq!(a.labels(), b.labels());
            assert_eq!(a.states(), b.states());
        }
    }

    #[test]
    fn test_decode_mismatch() {
        let text = encode(&registry(), 5, 1.0).unwrap();

        let mut other = Registry::new();
        other.insert(Module::new(PlateFamily::Daqc2, 1, 4));
        match decode(&text, &other).unwrap_err() {
            PlateError::HardwareMismatch { expected, found } => {
                assert_eq!(expected[1], "1");
                assert_eq!(found[1], "X");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_rejects_bad_fields() {
        let registry = registry();
        let text = encode(&registry, 5, 1.0).unwrap();

        let short = text.trim_end().rsplit_once(',').unwrap().0.to_string();
        assert!(matches!(decode(&short, &registry), Err(PlateError::SetupFormat(_))));

        let bad_count = text.replace(",5,1\n", ",five,1\n");
        assert!(matches!(decode(&bad_count, &registry), Err(PlateError::SetupFormat(_))));

        let bad_period = text.replace(",5,1\n", ",5,-2\n");
        assert!(matches!(decode(&bad_period, &registry), Err(PlateError::SetupFormat(_))));

        let huge_period = text.replace(",5,1\n", ",5,1e20\n");
        assert!(matches!(decode(&huge_period, &registry), Err(PlateError::SetupFormat(_))));
    }

    #[test]
    fn test_load_mismatch_leaves_registry_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.stp");

        let mut saved = registry();
        saved.select_all();
        save(&path, &saved, 5, 1.0).unwrap();

        let mut live = Registry::new();
        live.insert(Module::new(PlateFamily::Daqc2, 0, 4));
        assert!(load(&path, &mut live).is_err());
        assert_eq!(live.enabled_count(), 0);
    }
}
