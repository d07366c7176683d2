//! YAML configuration of the function corpus.
//!
//! ```yaml
//! biddingFunctions:
//!   - uri: local://double
//!     source: |
//!       (interestGroup, auctionSignals, perBuyerSignals, trustedBiddingSignals, browserSignals) =>
//!           ({ bid: perBuyerSignals.foo * 2 })
//!   - uri: https://dsp.example/bidding/multiply.js
//! adScoringFunctions:
//!   - uri: https://ssp.example/auction/preferFunnyAds.js
//! ```
//!
//! Both lists are required (they may be empty). `source` is required iff
//! the URI scheme is `local`, which is enforced when the script is fetched.
//! Unrecognized keys on an entry are ignored.

use serde::Deserialize;

use bidbox_common::status::{Result, Status};

/// One configured function: its stable identity plus, for `local://` URIs,
/// the inline script body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    pub uri: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl FunctionSpec {
    /// Spec for an inline script.
    pub fn local(uri: impl Into<String>, source: impl Into<String>) -> Self {
        Self { uri: uri.into(), source: Some(source.into()) }
    }

    /// Spec for a remotely fetched script.
    pub fn remote(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), source: None }
    }
}

/// The full function corpus configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub bidding_functions: Vec<FunctionSpec>,
    pub ad_scoring_functions: Vec<FunctionSpec>,
}

impl Configuration {
    /// Loads and parses the configuration file.
    ///
    /// # Errors
    ///
    /// - not-found when the file cannot be opened;
    /// - invalid-argument when the file is not YAML at all or its structure
    ///   does not match the expected shape.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Status::not_found(format!("Could not open the YAML configuration file: {e}"))
        })?;
        Self::from_yaml(&text)
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        // Two stages so a syntactically broken file reads differently from
        // a well-formed file with the wrong structure.
        let document: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| {
            Status::invalid_argument(format!(
                "Parsing failure reading the YAML configuration file: {e}"
            ))
        })?;
        serde_yaml::from_value(document)
            .map_err(|e| Status::invalid_argument(format!("Malformed YAML configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidbox_common::status::StatusKind;
    use std::io::Write;

    #[test]
    fn parses_local_and_remote_specs() {
        let config = Configuration::from_yaml(
            r#"
biddingFunctions:
  - uri: local://double
    source: |
      input => ({ bid: input.perBuyerSignals.foo * 2 })
  - uri: https://dsp.example/bidding/triple.js
adScoringFunctions: []
"#,
        )
        .unwrap();
        assert_eq!(config.bidding_functions.len(), 2);
        assert_eq!(config.bidding_functions[0].uri, "local://double");
        assert!(config.bidding_functions[0].source.as_deref().unwrap().contains("foo * 2"));
        assert_eq!(config.bidding_functions[1], FunctionSpec::remote("https://dsp.example/bidding/triple.js"));
        assert!(config.ad_scoring_functions.is_empty());
    }

    #[test]
    fn extra_keys_on_an_entry_are_ignored() {
        let config = Configuration::from_yaml(
            r#"
biddingFunctions:
  - name: double
    uri: local://double
    source: "input => ({ bid: 2 })"
adScoringFunctions: []
"#,
        )
        .unwrap();
        assert_eq!(config.bidding_functions[0].uri, "local://double");
    }

    #[test]
    fn missing_file_is_not_found() {
        let error = Configuration::from_file("/definitely/not/here.yaml").unwrap_err();
        assert_eq!(error.kind(), StatusKind::NotFound);
        assert!(error.message().contains("Could not open the YAML configuration file"));
    }

    #[test]
    fn file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "biddingFunctions: []\nadScoringFunctions:\n  - uri: https://ssp.example/score.js\n"
        )
        .unwrap();
        let config = Configuration::from_file(file.path()).unwrap();
        assert_eq!(config.ad_scoring_functions.len(), 1);
    }

    #[test]
    fn unparseable_yaml_is_a_parsing_failure() {
        let error = Configuration::from_yaml("[ foo\n  bar: invalid,").unwrap_err();
        assert_eq!(error.kind(), StatusKind::InvalidArgument);
        assert!(error.message().contains("Parsing failure reading the YAML configuration file"));
    }

    #[test]
    fn wrong_structure_is_malformed() {
        for text in [
            // source must be a string
            "biddingFunctions:\n  - uri: local://x\n    source: [1, 2, 3]\nadScoringFunctions: []\n",
            // uri must be a string
            "biddingFunctions:\n  - uri: [foo, bar]\nadScoringFunctions: []\n",
            // entries must carry a uri
            "biddingFunctions:\n  - source: \"inputs => 42.0\"\nadScoringFunctions: []\n",
            // lists must be lists
            "biddingFunctions: abc\nadScoringFunctions: []\n",
        ] {
            let error = Configuration::from_yaml(text).unwrap_err();
            assert_eq!(error.kind(), StatusKind::InvalidArgument);
            assert!(
                error.message().contains("Malformed YAML configuration"),
                "unexpected message: {}",
                error.message()
            );
        }
    }
}
