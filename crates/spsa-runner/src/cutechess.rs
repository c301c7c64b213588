//! Paired matches through a `cutechess-cli` compatible runner.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spsa_optimizer::{Evaluator, Verifier};
use spsa_types::{config_error, ConfigError, EvaluationError, VerificationError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::builder::{BuilderConfig, EngineHandle};
use crate::process::{describe, run_captured, ProcessError};

/// Match runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRunnerConfig {
    pub command: String,

    /// Runner's engine registry (a JSON array). Entries for the tuner's
    /// engines are rewritten once before the first iteration.
    pub engines_config: Option<PathBuf>,

    /// Games per iteration.
    pub games: u32,

    /// Games per verification match.
    pub verification_games: u32,

    pub concurrency: u32,

    pub time_control: String,

    /// Reference engine time control during verification.
    pub reference_time_control: String,

    pub hash_mb: u32,
    pub verification_hash_mb: u32,

    pub book: Option<PathBuf>,
    pub book_depth: u32,

    pub event: String,

    /// Appended verbatim to every invocation.
    pub extra_args: Vec<String>,

    pub timeout_secs: Option<u64>,
}

impl Default for MatchRunnerConfig {
    fn default() -> Self {
        Self {
            command: "cutechess-cli".into(),
            engines_config: None,
            games: 2,
            verification_games: 1024,
            concurrency: 48,
            time_control: "10+0.1".into(),
            reference_time_control: "30+0.3".into(),
            hash_mb: 32,
            verification_hash_mb: 256,
            book: None,
            book_depth: 10,
            event: "SPSA_TUNING".into(),
            extra_args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl MatchRunnerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(config_error!("match_runner.command must not be empty"));
        }
        if self.games == 0 || self.verification_games == 0 {
            return Err(config_error!("match_runner game counts must be positive"));
        }
        if self.concurrency == 0 {
            return Err(config_error!("match_runner.concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Outcome of a match from the first engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl MatchScore {
    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Raw `wins - losses`; not normalized by the number of games.
    pub fn net(&self) -> f64 {
        f64::from(self.wins) - f64::from(self.losses)
    }
}

/// Parses the last `Score of A vs B: W - L - D [ratio] N` line.
pub fn parse_score(log: &str) -> Result<MatchScore, EvaluationError> {
    let malformed = |message: String| EvaluationError::MalformedOutput { message };

    let idx = log
        .rfind("Score of ")
        .ok_or_else(|| malformed("no `Score of` line in match output".into()))?;
    let line = log[idx..].lines().next().unwrap_or_default();
    let after_colon = line
        .split_once(':')
        .map(|(_, rest)| rest)
        .ok_or_else(|| malformed(format!("score line without ':': {line:?}")))?;
    let section = after_colon.split('[').next().unwrap_or_default().trim();

    let counts = section
        .split(" - ")
        .map(|n| n.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| malformed(format!("bad count in {section:?}: {e}")))?;
    match counts.as_slice() {
        [wins, losses, draws] => Ok(MatchScore {
            wins: *wins,
            losses: *losses,
            draws: *draws,
        }),
        _ => Err(malformed(format!("expected `W - L - D`, found {section:?}"))),
    }
}

/// Parses the last `Elo difference: X +/- Y` line.
pub fn parse_elo(log: &str) -> Result<f64, VerificationError> {
    let malformed = |message: String| VerificationError::MalformedRating { message };

    let idx = log
        .rfind("Elo difference:")
        .ok_or_else(|| malformed("no `Elo difference` line in match output".into()))?;
    let tail = &log[idx + "Elo difference:".len()..];
    let value = tail
        .split("+/-")
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("empty Elo estimate".into()))?;
    let elo = value
        .parse::<f64>()
        .map_err(|e| malformed(format!("bad Elo estimate {value:?}: {e}")))?;
    if !elo.is_finite() {
        return Err(malformed(format!("non-finite Elo estimate {value:?}")));
    }
    Ok(elo)
}

/// One engine entry of the runner's registry.
pub fn engine_entry(name: &str, working_dir: &Path) -> Value {
    json!({
        "command": format!("./{name}"),
        "name": name,
        "options": [
            { "alias": "", "default": 64, "max": 65536, "min": 1, "name": "Hash", "type": "spin", "value": 256 },
            { "alias": "", "default": 1, "max": 64, "min": 1, "name": "Threads", "type": "spin", "value": 1 },
            { "alias": "", "default": 10, "max": 1000, "min": 1, "name": "Move Overhead", "type": "spin", "value": 10 }
        ],
        "protocol": "uci",
        "stderrFile": "",
        "workingDirectory": working_dir.display().to_string(),
    })
}

/// Replaces the entries named in `names`, keeping everything else.
pub fn merge_engine_entries(existing: Vec<Value>, names: &[String], working_dir: &Path) -> Vec<Value> {
    let mut merged: Vec<Value> = existing
        .into_iter()
        .filter(|entry| {
            entry
                .get("name")
                .and_then(Value::as_str)
                .map_or(true, |n| !names.iter().any(|m| m == n))
        })
        .collect();
    merged.extend(names.iter().map(|n| engine_entry(n, working_dir)));
    merged
}

/// Launches matches and returns their combined output.
#[derive(Debug, Clone)]
pub struct MatchRunner {
    config: MatchRunnerConfig,
}

/// Parameters of a single invocation.
struct MatchSpec<'a> {
    first: &'a str,
    second: &'a str,
    second_time_control: &'a str,
    games: u32,
    hash_mb: u32,
    repeat: bool,
}

impl MatchRunner {
    pub fn new(config: MatchRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchRunnerConfig {
        &self.config
    }

    fn arguments(&self, spec: &MatchSpec<'_>) -> Vec<String> {
        let c = &self.config;
        let mut args: Vec<String> = vec!["-tournament".into(), "gauntlet".into()];
        if spec.repeat {
            args.push("-repeat".into());
        }
        args.extend([
            "-concurrency".into(),
            c.concurrency.to_string(),
            "-engine".into(),
            format!("conf={}", spec.first),
            format!("tc={}", c.time_control),
            "-engine".into(),
            format!("conf={}", spec.second),
            format!("tc={}", spec.second_time_control),
            "-ratinginterval".into(),
            "1".into(),
            "-recover".into(),
            "-event".into(),
            c.event.clone(),
            "-resultformat".into(),
            "per-color".into(),
            "-each".into(),
        ]);
        if let Some(book) = &c.book {
            args.push(format!("book={}", book.display()));
            args.push(format!("bookdepth={}", c.book_depth));
        }
        args.extend([
            "proto=uci".into(),
            format!("option.Hash={}", spec.hash_mb),
            "option.Threads=1".into(),
            "-games".into(),
            spec.games.to_string(),
        ]);
        args.extend(c.extra_args.iter().cloned());
        args
    }

    fn play(&self, spec: &MatchSpec<'_>) -> Result<String, EvaluationError> {
        let args = self.arguments(spec);
        let described = describe(&self.config.command, &args);
        debug!("Running match: {described}");

        let mut command = Command::new(&self.config.command);
        command.args(&args);
        let limit = self.config.timeout_secs.map(Duration::from_secs);
        let output = run_captured(&mut command, limit).map_err(|e| match e {
            ProcessError::Runtime(source) | ProcessError::Spawn(source) | ProcessError::Wait(source) => {
                EvaluationError::Spawn {
                    command: described.clone(),
                    source,
                }
            }
            ProcessError::TimedOut(timeout_seconds) => EvaluationError::Timeout { timeout_seconds },
        })?;

        if !output.success() {
            return Err(EvaluationError::CommandFailed {
                status: output.status.to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// [`Evaluator`] playing `plus` against `minus` for a small number of games.
#[derive(Debug, Clone)]
pub struct CutechessEvaluator {
    runner: MatchRunner,
    managed_names: Vec<String>,
    engine_dir: PathBuf,
}

impl CutechessEvaluator {
    pub fn new(config: MatchRunnerConfig, builder: &BuilderConfig) -> Self {
        Self {
            runner: MatchRunner::new(config),
            managed_names: builder.managed_names(),
            engine_dir: builder.engine_dir.clone(),
        }
    }

    fn write_engines_config(&self, path: &Path) -> Result<(), EvaluationError> {
        let setup_err = |message: String| EvaluationError::Setup { message };

        let existing: Vec<Value> = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Ignoring unreadable engine registry {}: {e}", path.display());
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        let working_dir = std::path::absolute(&self.engine_dir).unwrap_or_else(|_| self.engine_dir.clone());
        let merged = merge_engine_entries(existing, &self.managed_names, &working_dir);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| setup_err(format!("{}: {e}", parent.display())))?;
        }
        let text = serde_json::to_string_pretty(&merged).map_err(|e| setup_err(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| setup_err(format!("{}: {e}", path.display())))?;
        info!("Registered {} engines in {}", self.managed_names.len(), path.display());
        Ok(())
    }
}

impl Evaluator<EngineHandle> for CutechessEvaluator {
    fn prepare(&mut self) -> Result<(), EvaluationError> {
        match self.runner.config().engines_config.clone() {
            Some(path) => self.write_engines_config(&path),
            None => Ok(()),
        }
    }

    fn evaluate(&mut self, plus: &EngineHandle, minus: &EngineHandle) -> Result<f64, EvaluationError> {
        let config = self.runner.config();
        let log = self.runner.play(&MatchSpec {
            first: &plus.name,
            second: &minus.name,
            second_time_control: &config.time_control,
            games: config.games,
            hash_mb: config.hash_mb,
            repeat: false,
        })?;
        let score = parse_score(&log)?;
        info!(
            wins = score.wins,
            losses = score.losses,
            draws = score.draws,
            "Score (wins - losses): {}",
            score.net()
        );
        Ok(score.net())
    }
}

/// [`Verifier`] playing a candidate against the realized reference engine.
#[derive(Debug, Clone)]
pub struct CutechessVerifier {
    runner: MatchRunner,
}

impl CutechessVerifier {
    pub fn new(config: MatchRunnerConfig) -> Self {
        Self {
            runner: MatchRunner::new(config),
        }
    }
}

impl Verifier<EngineHandle> for CutechessVerifier {
    fn verify(
        &mut self,
        candidate: &EngineHandle,
        reference: &EngineHandle,
        iteration: usize,
    ) -> Result<f64, VerificationError> {
        let config = self.runner.config();
        debug!(
            "Verifying {} against {} after {iteration} iterations",
            candidate.name, reference.name
        );
        let log = self.runner.play(&MatchSpec {
            first: &candidate.name,
            second: &reference.name,
            second_time_control: &config.reference_time_control,
            games: config.verification_games,
            hash_mb: config.verification_hash_mb,
            repeat: true,
        })?;
        parse_elo(&log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCH_LOG: &str = "\
Started game 1 of 2 (engine-plus vs engine-minus)
Score of engine-plus vs engine-minus: 0 - 1 - 0  [0.000] 1
Finished game 2 (engine-minus vs engine-plus): 0-1 {Black mates}
Score of engine-plus vs engine-minus: 2 - 1 - 3  [0.583] 6
Elo difference: 58.5 +/- 120.3, LOS: 71.2 %, DrawRatio: 50.0 %
Finished match
";

    #[test]
    fn parses_last_score_line_as_wins_losses_draws() {
        let score = parse_score(MATCH_LOG).unwrap();
        assert_eq!(score, MatchScore { wins: 2, losses: 1, draws: 3 });
        assert_eq!(score.games(), 6);
        assert_eq!(score.net(), 1.0);
    }

    #[test]
    fn losing_match_gives_negative_score() {
        let log = "Score of a vs b: 0 - 2 - 0  [0.000] 2\n";
        assert_eq!(parse_score(log).unwrap().net(), -2.0);
    }

    #[test]
    fn rejects_missing_or_garbled_scores() {
        assert!(matches!(
            parse_score("Finished match\n"),
            Err(EvaluationError::MalformedOutput { .. })
        ));
        assert!(parse_score("Score of a vs b: 1 - x - 0 [0.5] 1\n").is_err());
        assert!(parse_score("Score of a vs b: 1 - 0 [0.5] 1\n").is_err());
    }

    #[test]
    fn parses_elo_estimate() {
        assert_eq!(parse_elo(MATCH_LOG).unwrap(), 58.5);
        assert_eq!(parse_elo("Elo difference: -12.75 +/- 8.1, LOS: 0.1 %").unwrap(), -12.75);
        assert!(parse_elo("Score of a vs b: 1 - 0 - 0").is_err());
    }

    #[test]
    fn one_sided_matches_have_no_finite_elo() {
        for log in ["Elo difference: -nan +/- nan", "Elo difference: inf +/- nan", "Elo difference: -inf +/- inf"] {
            assert!(matches!(parse_elo(log), Err(VerificationError::MalformedRating { .. })), "{log}");
        }
    }

    #[test]
    fn merge_replaces_only_managed_entries() {
        let existing = vec![
            json!({ "name": "stockfish", "command": "./stockfish" }),
            json!({ "name": "engine-plus", "command": "./stale" }),
        ];
        let names = vec!["engine-plus".to_string(), "engine-minus".to_string()];
        let merged = merge_engine_entries(existing, &names, Path::new("/srv/engines"));

        let got: Vec<&str> = merged.iter().filter_map(|e| e["name"].as_str()).collect();
        assert_eq!(got, vec!["stockfish", "engine-plus", "engine-minus"]);
        assert_eq!(merged[1]["command"], "./engine-plus");
        assert_eq!(merged[1]["workingDirectory"], "/srv/engines");
        assert_eq!(merged[1]["protocol"], "uci");
    }

    #[test]
    fn arguments_follow_configuration() {
        let config = MatchRunnerConfig {
            book: Some(PathBuf::from("/books/gm2001.bin")),
            extra_args: vec!["-pgnout".into(), "games.pgn".into()],
            ..MatchRunnerConfig::default()
        };
        let runner = MatchRunner::new(config);
        let args = runner.arguments(&MatchSpec {
            first: "engine-plus",
            second: "engine-minus",
            second_time_control: "10+0.1",
            games: 2,
            hash_mb: 32,
            repeat: false,
        });
        let joined = args.join(" ");
        assert!(joined.starts_with("-tournament gauntlet -concurrency 48 -engine conf=engine-plus tc=10+0.1"));
        assert!(joined.contains("book=/books/gm2001.bin bookdepth=10"));
        assert!(joined.contains("option.Hash=32"));
        assert!(joined.ends_with("-games 2 -pgnout games.pgn"));
        assert!(!joined.contains("-repeat"));
    }

    #[test]
    fn prepare_writes_registry() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = dir.path().join("cutechess").join("engines.json");
        std::fs::create_dir_all(registry.parent().unwrap()).unwrap();
        std::fs::write(&registry, r#"[{"name": "other"}]"#).unwrap();

        let builder = BuilderConfig {
            engine_dir: dir.path().join("engines"),
            ..BuilderConfig::default()
        };
        let config = MatchRunnerConfig {
            engines_config: Some(registry.clone()),
            ..MatchRunnerConfig::default()
        };
        let mut evaluator = CutechessEvaluator::new(config, &builder);
        evaluator.prepare().unwrap();

        let written: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&registry).unwrap()).unwrap();
        assert_eq!(written.len(), 5);
        assert_eq!(written[0]["name"], "other");
    }

    #[cfg(unix)]
    #[test]
    fn evaluator_runs_the_match_command() {
        let config = MatchRunnerConfig {
            command: "echo".into(),
            extra_args: vec!["\nScore of engine-plus vs engine-minus: 1 - 0 - 1 [0.750] 2".into()],
            ..MatchRunnerConfig::default()
        };
        let mut evaluator = CutechessEvaluator::new(config, &BuilderConfig::default());
        let plus = EngineHandle {
            name: "engine-plus".into(),
            path: PathBuf::from("engines/engine-plus"),
        };
        let minus = EngineHandle {
            name: "engine-minus".into(),
            path: PathBuf::from("engines/engine-minus"),
        };
        assert_eq!(evaluator.evaluate(&plus, &minus).unwrap(), 1.0);
    }

    #[cfg(unix)]
    #[test]
    fn verifier_plays_the_realized_reference() {
        let config = MatchRunnerConfig {
            command: "echo".into(),
            extra_args: vec!["\nElo difference: 12.5 +/- 3.0, LOS: 99.9 %".into()],
            ..MatchRunnerConfig::default()
        };
        let runner = MatchRunner::new(config.clone());
        let mut verifier = CutechessVerifier::new(config);
        let candidate = EngineHandle {
            name: "engine-inter".into(),
            path: PathBuf::from("engines/engine-inter"),
        };
        let reference = EngineHandle {
            name: "engine-reference".into(),
            path: PathBuf::from("engines/engine-reference"),
        };
        assert_eq!(verifier.verify(&candidate, &reference, 40).unwrap(), 12.5);

        let log = runner
            .play(&MatchSpec {
                first: &candidate.name,
                second: &reference.name,
                second_time_control: "30+0.3",
                games: 1024,
                hash_mb: 256,
                repeat: true,
            })
            .unwrap();
        assert!(log.contains("-repeat"));
        assert!(log.contains("conf=engine-reference tc=30+0.3"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_runner_is_an_evaluation_error() {
        let config = MatchRunnerConfig {
            command: "false".into(),
            ..MatchRunnerConfig::default()
        };
        let mut evaluator = CutechessEvaluator::new(config, &BuilderConfig::default());
        let handle = EngineHandle {
            name: "engine-plus".into(),
            path: PathBuf::from("engines/engine-plus"),
        };
        assert!(matches!(
            evaluator.evaluate(&handle, &handle),
            Err(EvaluationError::CommandFailed { .. })
        ));
    }
}
