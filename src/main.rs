#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "The tas-replay CLI requires the \"cli\" feature. Rebuild with `--features cli` to enable it."
    );
}

#[cfg(feature = "cli")]
mod cli {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Instant;

    use anyhow::{bail, Context};
    use clap::{Parser, Subcommand};

    use tas_replay::script::parser::is_skippable;
    use tas_replay::{
        parse_line, Buttons, LineFileSource, PlaybackConfig, PlaybackEngine, Populator,
        RecordingSink, TimedVsync, UnthrottledVsync, VsyncGate,
    };

    #[derive(Parser)]
    #[command(name = "tas-replay")]
    #[command(about = "Replay frame-exact controller scripts in sync with display refresh")]
    struct Args {
        /// JSON configuration file
        #[arg(short, long, global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Play scripts, each on its own virtual controller
        Play {
            /// Script files
            #[arg(required = true)]
            scripts: Vec<PathBuf>,

            #[command(flatten)]
            output: OutputArgs,
        },
        /// Play `script<N>.txt` from the configured scripts directory
        Slot {
            /// Slot number (1-12)
            #[arg(value_parser = clap::value_parser!(u8).range(1..=12))]
            slot: u8,

            #[command(flatten)]
            output: OutputArgs,
        },
        /// Parse a script and report malformed lines
        Check {
            /// Script file
            script: PathBuf,
        },
        /// Press buttons (e.g. "A" or "L;R") for a few frames, then release
        Tap {
            /// `;`-separated key names
            buttons: String,

            /// Frames to hold (default from config)
            #[arg(long)]
            frames: Option<u32>,
        },
    }

    #[derive(clap::Args)]
    struct OutputArgs {
        /// Do not wait for refresh edges (dry run)
        #[arg(long)]
        unthrottled: bool,

        /// Print session reports as JSON
        #[arg(long)]
        json: bool,
    }

    fn load_config(path: Option<&Path>) -> anyhow::Result<PlaybackConfig> {
        match path {
            Some(path) => PlaybackConfig::load(path)
                .with_context(|| format!("loading config '{}'", path.display())),
            None => Ok(PlaybackConfig::default()),
        }
    }

    fn play(
        config: &PlaybackConfig,
        scripts: &[PathBuf],
        output: &OutputArgs,
    ) -> anyhow::Result<()> {
        let populator = Populator::start(config).context("starting populator")?;
        let vsync: Box<dyn VsyncGate> = if output.unthrottled {
            Box::new(UnthrottledVsync::new())
        } else {
            Box::new(TimedVsync::start(config.refresh_rate_hz))
        };

        let started = Instant::now();
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = scripts
                .iter()
                .map(|path| {
                    let populator = &populator;
                    let vsync = vsync.as_ref();
                    scope.spawn(move || {
                        let engine = PlaybackEngine::new(vsync).with_populator(populator);
                        let mut controller = RecordingSink::new();
                        engine.run(
                            LineFileSource::open(path, config.fill_threshold),
                            &mut controller,
                        )
                    })
                })
                .collect();

            handles.into_iter().map(|handle| handle.join()).collect()
        });
        populator.shutdown();

        let mut reports = Vec::new();
        let mut failures = 0;
        for result in results {
            match result {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    eprintln!("{e}");
                    failures += 1;
                }
                Err(_) => {
                    eprintln!("controller thread panicked");
                    failures += 1;
                }
            }
        }

        if output.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            for (index, report) in reports.iter().enumerate() {
                println!("\n=== Controller {} ===", index + 1);
                println!("Script:            {}", report.script);
                println!("Frames committed:  {}", report.frames_committed);
                println!("Messages applied:  {}", report.messages_applied);
                if let Some(frame) = report.last_scripted_frame {
                    println!("Last scripted:     frame {frame}");
                }
                if report.late_messages > 0 {
                    println!("Late messages:     {}", report.late_messages);
                }
            }
            println!(
                "\nPlayback complete in {:.2} seconds",
                started.elapsed().as_secs_f32()
            );
        }

        if failures > 0 {
            bail!("{failures} script(s) could not start");
        }
        Ok(())
    }

    fn check(path: &Path) -> anyhow::Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading script '{}'", path.display()))?;

        let mut records = 0usize;
        let mut errors = 0usize;
        let mut last_frame: Option<u64> = None;
        for (index, line) in text.lines().enumerate() {
            if is_skippable(line) {
                continue;
            }
            match parse_line(line) {
                Ok(msg) => {
                    if last_frame.is_some_and(|last| msg.frame < last) {
                        println!("line {}: frame {} goes backwards", index + 1, msg.frame);
                    }
                    last_frame = Some(msg.frame);
                    records += 1;
                }
                Err(e) => {
                    println!("line {}: {e}", index + 1);
                    errors += 1;
                }
            }
        }

        match last_frame {
            Some(frame) => println!("{records} records, last frame {frame}"),
            None => println!("{records} records"),
        }
        if errors > 0 {
            bail!("{errors} malformed line(s) in '{}'", path.display());
        }
        Ok(())
    }

    fn tap(config: &PlaybackConfig, keys: &str, frames: Option<u32>) -> anyhow::Result<()> {
        let buttons = keys.split(';').try_fold(Buttons::empty(), |acc, name| {
            Buttons::from_key_name(name.trim())
                .map(|button| acc | button)
                .with_context(|| format!("unknown key '{name}'"))
        })?;

        let vsync = TimedVsync::start(config.refresh_rate_hz);
        let engine = PlaybackEngine::new(&vsync);
        let mut controller = RecordingSink::new();
        engine.tap(
            &mut controller,
            buttons,
            frames.unwrap_or(config.tap_hold_frames),
        );

        for (frame, state) in controller.commits().iter().enumerate() {
            println!("{frame} {state}");
        }
        Ok(())
    }

    pub fn run() -> anyhow::Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();

        let args = Args::parse();
        let config = load_config(args.config.as_deref())?;

        match args.command {
            Command::Play { scripts, output } => play(&config, &scripts, &output),
            Command::Slot { slot, output } => {
                let path = config.script_slot(slot)?;
                play(&config, &[path], &output)
            }
            Command::Check { script } => check(&script),
            Command::Tap { buttons, frames } => tap(&config, &buttons, frames),
        }
    }
}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
