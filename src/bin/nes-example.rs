#[macro_use]
extern crate log;

use std::fs::File;

use clap::{App, Arg};

use nes::bin_utils::args::{ArgAugmenter, OptimizerArgs, RunConfig};
use nes::example::{AckleyEnv, MatyasEnv, TargetEnv};
use nes_core::optimizer::Environment;

fn optimize<E>(rc: &RunConfig, env: &E, save: Option<&str>) -> nes_core::Result<()>
where
    E: Environment<f32>,
{
    let best = rc.settings.run::<f32, E>(env, rc.stop)?;
    println!(
        "Best Score: {}, Best Model: {:?}, Stats: {:?}",
        best.fitness, best.vector.data, best.aux
    );
    if let Some(path) = save {
        let f = File::create(path)?;
        serde_json::to_writer(f, &best.vector)?;
        info!("Wrote best model to {}", path);
    }
    Ok(())
}

fn main() -> () {
    env_logger::init();

    let app = App::new("nes-example")
        .version("0.1.0")
        .about("Minimizes test functions with block factorized NES")
        .arg(
            Arg::with_name("env")
                .long("env")
                .takes_value(true)
                .possible_values(&["matyas", "ackley", "target"])
                .default_value("ackley")
                .help("Function to minimize"),
        )
        .arg(
            Arg::with_name("save")
                .long("save")
                .takes_value(true)
                .help("Writes the best vector as JSON to this path"),
        );

    let args = OptimizerArgs.add_args(app).get_matches();
    let rc = match OptimizerArgs.load_from_args(&args) {
        Ok(rc) => rc,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let save = args.value_of("save");
    let res = match args.value_of("env") {
        Some("matyas") => optimize(&rc, &MatyasEnv, save),
        Some("target") => optimize(&rc, &TargetEnv::ascending(rc.settings.width), save),
        _ => optimize(&rc, &AckleyEnv, save),
    };
    if let Err(e) = res {
        error!("{}", e);
        std::process::exit(1);
    }
}
