use std::{
    env,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clay::{Runner, StderrTracer};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <clayfile>", args.first().map_or("clay", String::as_str));
        return ExitCode::FAILURE;
    }
    let file = Path::new(&args[1]);
    if !file.is_file() {
        eprintln!("error: {} is not a file", file.display());
        return ExitCode::FAILURE;
    }

    let runner = Runner::new();
    for path in search_paths() {
        runner.add_search_path(path);
    }
    if env::var("CLAY_TRACE").is_ok_and(|v| v == "1") {
        runner.set_tracer(Box::new(StderrTracer));
    }

    match runner.run_file(file) {
        Ok(outcome) => {
            println!("analyzing main()");
            println!(
                "returns {} by {}",
                outcome.return_type,
                if outcome.return_by_ref { "ref" } else { "value" }
            );
            println!();
            println!("evaluating main()");
            println!("{}", outcome.value_type);
            println!("{}", outcome.value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// `CLAY_PATH` entries (colon separated) followed by `<exe-dir>/lib-clay`.
fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(extra) = env::var("CLAY_PATH") {
        paths.extend(extra.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.join("lib-clay"));
        }
    }
    paths
}
