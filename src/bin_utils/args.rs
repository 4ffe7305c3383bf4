use std::str::FromStr;

use clap::{App, Arg, ArgMatches};

use nes_core::nes::{BlockNatural, StopRule};
use nes_core::{NesError, Result};

/// Trait to add new arguments to the current app
pub trait ArgAugmenter {
    /// Type of struct to output from this parser
    type Output;

    /// Specifies arguments to add
    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b>;

    /// Parses the arguments
    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> Self::Output;
}

// Parses an optional argument, failing only when present and malformed
fn parse<T: FromStr>(args: &ArgMatches, name: &str) -> Result<Option<T>> {
    if !args.is_present(name) {
        return Ok(None);
    }
    value_t!(args, name, T)
        .map(Some)
        .map_err(|e| NesError::InvalidSettings(e.to_string()))
}

/// Optimizer settings along with when to stop
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Settings for the optimizer
    pub settings: BlockNatural,
    /// Early exit rule
    pub stop: StopRule,
}

/// Struct defining the optimizer arguments using ArgAugmenter.  Values given on
/// the command line override those read from `--config`.
pub struct OptimizerArgs;

impl ArgAugmenter for OptimizerArgs {
    type Output = Result<RunConfig>;

    /// Specifies arguments to add for the optimizer
    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        app
      .arg(Arg::with_name("config")
           .long("config")
           .takes_value(true)
           .help("JSON file of optimizer settings"))
      .arg(Arg::with_name("width")
           .short("w")
           .long("width")
           .takes_value(true)
           .help("Length of the parameter vector"))
      .arg(Arg::with_name("models")
           .short("m")
           .long("models")
           .takes_value(true)
           .help("Number of blocks the vector is split into each generation"))
      .arg(Arg::with_name("population")
           .short("p")
           .long("population")
           .takes_value(true)
           .help("Number of individuals in the population"))
      .arg(Arg::with_name("cut")
           .short("c")
           .long("cut")
           .takes_value(true)
           .help("Number of survivors carried into the next generation"))
      .arg(Arg::with_name("cutoff")
           .long("cutoff")
           .takes_value(true)
           .allow_hyphen_values(true)
           .help("Fit loss at which to stop early.  -1 disables early stopping"))
      .arg(Arg::with_name("eta")
           .long("eta")
           .takes_value(true)
           .help("Step size of the fit"))
      .arg(Arg::with_name("iters")
           .short("i")
           .long("iters")
           .takes_value(true)
           .help("Number of generations to run before exiting"))
      .arg(Arg::with_name("report_iters")
           .short("r")
           .long("report")
           .takes_value(true)
           .help("How often to report progress."))
      .arg(Arg::with_name("seed")
           .long("seed")
           .takes_value(true)
           .help("Seed for the random stream"))
      .arg(Arg::with_name("workers")
           .long("workers")
           .takes_value(true)
           .help("Worker threads.  Defaults to one per hardware thread"))
      .arg(Arg::with_name("rescore_elite")
           .long("rescore-elite")
           .help("Re-evaluates the survivors every generation"))
      .arg(Arg::with_name("stop")
           .long("stop")
           .takes_value(true)
           .possible_values(&["budget", "target", "stall"])
           .help("When to stop before the generation budget runs out"))
      .arg(Arg::with_name("stop_param")
           .long("stop-param")
           .takes_value(true)
           .requires("stop")
           .help("Fitness for `target`, number of generations for `stall`"))
    }

    /// Parses the arguments for the optimizer
    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> Self::Output {
        let mut settings = match args.value_of("config") {
            Some(path) => BlockNatural::load(path)?,
            None => BlockNatural::default(),
        };

        if let Some(v) = parse(args, "width")? {
            settings.width = v;
        }
        if let Some(v) = parse(args, "models")? {
            settings.models = v;
        }
        if let Some(v) = parse(args, "population")? {
            settings.population = v;
        }
        if let Some(v) = parse(args, "cut")? {
            settings.cut = v;
        }
        if let Some(v) = parse(args, "cutoff")? {
            settings.cutoff = v;
        }
        if let Some(v) = parse(args, "eta")? {
            settings.eta = v;
        }
        if let Some(v) = parse(args, "iters")? {
            settings.iterations = v;
        }
        if let Some(v) = parse(args, "report_iters")? {
            settings.report_iter = v;
        }
        if let Some(v) = parse(args, "seed")? {
            settings.seed = v;
        }
        if let Some(v) = parse(args, "workers")? {
            settings.workers = Some(v);
        }
        if args.is_present("rescore_elite") {
            settings.rescore_elite = true;
        }
        settings.validate()?;

        let stop = match args.value_of("stop").unwrap_or("budget") {
            "target" => StopRule::Target(parse(args, "stop_param")?.unwrap_or(0.)),
            "stall" => StopRule::Stall(parse(args, "stop_param")?.unwrap_or(100)),
            _ => StopRule::Budget,
        };
        stop.validate()?;

        Ok(RunConfig { settings, stop })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(argv: &[&str]) -> Result<RunConfig> {
        let app = OptimizerArgs.add_args(App::new("test"));
        let matches = app.get_matches_from(argv);
        OptimizerArgs.load_from_args(&matches)
    }

    #[test]
    fn test_defaults() {
        let rc = load(&["test", "--width", "10", "--models", "2"]).unwrap();
        assert_eq!(rc.settings.width, 10);
        assert_eq!(rc.settings.models, 2);
        assert_eq!(rc.settings.population, BlockNatural::default().population);
        assert_eq!(rc.stop, StopRule::Budget);
    }

    #[test]
    fn test_overrides() {
        let rc = load(&[
            "test", "-w", "6", "-p", "8", "-c", "2", "--cutoff", "-1", "--eta", "0.01",
            "--workers", "3", "--rescore-elite", "--stop", "stall", "--stop-param", "7",
        ])
        .unwrap();
        assert_eq!(rc.settings.population, 8);
        assert_eq!(rc.settings.cut, 2);
        assert_eq!(rc.settings.cutoff, -1.);
        assert_eq!(rc.settings.eta, 0.01);
        assert_eq!(rc.settings.workers, Some(3));
        assert!(rc.settings.rescore_elite);
        assert_eq!(rc.stop, StopRule::Stall(7));
    }

    #[test]
    fn test_invalid() {
        assert!(load(&["test", "--width", "abc"]).is_err());
        assert!(load(&["test", "--width", "2", "--models", "3"]).is_err());
        assert!(load(&["test", "--stop", "stall", "--stop-param", "0"]).is_err());
        assert!(load(&["test", "--stop", "stall", "--stop-param", "1"]).is_ok());
    }

    #[test]
    fn test_config_file() {
        let path = std::env::temp_dir().join("nes_args_test_config.json");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            write!(f, r#"{{"width": 9, "models": 3, "eta": 0.5}}"#).unwrap();
        }
        let p = path.to_str().unwrap();
        let rc = load(&["test", "--config", p, "--models", "1", "--stop", "target"]).unwrap();
        assert_eq!(rc.settings.width, 9);
        assert_eq!(rc.settings.models, 1);
        assert_eq!(rc.settings.eta, 0.5);
        assert_eq!(rc.stop, StopRule::Target(0.));
        std::fs::remove_file(&path).unwrap();
    }
}
