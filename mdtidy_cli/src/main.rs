use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use clap::Parser;
use mdtidy_cli::Commands;
use mdtidy_cli::MdtidyCli;
use mdtidy_core::BatchOptions;
use mdtidy_core::CONFIG_FILE_CANDIDATES;
use mdtidy_core::Diffs;
use mdtidy_core::FormatOptions;
use mdtidy_core::Formatter;
use mdtidy_core::MdtidyConfig;
use mdtidy_core::MdtidyError;
use mdtidy_core::SAMPLE_CONFIG;
use mdtidy_core::TypeLocation;
use mdtidy_core::check_files;
use mdtidy_core::discover_markdown_files;
use mdtidy_core::format_files;
use mdtidy_core::typegen::generate_sample;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV: &str = "MDTIDY_LOG";

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,cyan) => {
		if color_enabled() {
			format!("{}", $text.cyan())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

/// How a successful run ended.
enum Status {
	Clean,
	/// `fmt --check` found files that are not formatted.
	Unformatted,
}

fn main() {
	let args = MdtidyCli::parse();

	// Respect NO_COLOR env var, --no-color flag and terminal support.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stdout).is_some();
	if !use_color {
		USE_COLOR.store(false, Ordering::Relaxed);
	}

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose);

	let Some(command) = &args.command else {
		eprintln!("No subcommand specified. Run `mdtidy --help` for usage.");
		process::exit(1);
	};

	let runtime = match tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
	{
		Ok(runtime) => runtime,
		Err(e) => {
			eprintln!("{} failed to start the runtime: {e}", colored!("error:", red));
			process::exit(2);
		}
	};

	let result = runtime.block_on(async {
		let cancel = CancellationToken::new();
		let on_interrupt = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				tracing::warn!("interrupted, cancelling");
				on_interrupt.cancel();
			}
		});

		match command {
			Commands::Init => run_init(&args),
			Commands::Fmt {
				paths,
				check,
				remove_front_matter,
				no_directives,
				max_concurrency,
				width,
			} => {
				let overrides = FmtOverrides {
					remove_front_matter: *remove_front_matter,
					no_directives: *no_directives,
					max_concurrency: *max_concurrency,
					width: *width,
				};
				run_fmt(&args, paths, *check, &overrides, cancel).await
			}
			Commands::Gen { location } => run_gen(&args, location, cancel).await,
		}
	});

	match result {
		Ok(Status::Clean) => {}
		Ok(Status::Unformatted) => process::exit(1),
		Err(report) => {
			eprintln!("{report:?}");
			process::exit(2);
		}
	}
}

fn init_tracing(verbose: bool) {
	let default_directive = if verbose { "mdtidy_core=debug,mdtidy=debug" } else { "warn" };
	let filter =
		EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(color_enabled())
		.with_target(false)
		.init();
}

fn resolve_root(args: &MdtidyCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_options(root: &Path) -> miette::Result<FormatOptions> {
	let config = MdtidyConfig::load(root)?;
	if let Some(path) = MdtidyConfig::resolve_path(root) {
		tracing::debug!(path = %path.display(), "loaded config");
	}

	Ok(FormatOptions::from_config(config.as_ref()))
}

fn run_init(args: &MdtidyCli) -> miette::Result<Status> {
	let root = resolve_root(args);

	if let Some(existing) = MdtidyConfig::resolve_path(&root) {
		return Err(miette::miette!(
			code = "mdtidy::init::exists",
			help = "edit the existing file or delete it before running `mdtidy init`",
			"config file already exists: {}",
			existing.display()
		));
	}

	let config_path = root.join(CONFIG_FILE_CANDIDATES[0]);
	std::fs::write(&config_path, SAMPLE_CONFIG).map_err(MdtidyError::from)?;
	println!("Created {}", config_path.display());

	Ok(Status::Clean)
}

/// Command line flags of `fmt` that take precedence over the config file.
struct FmtOverrides {
	remove_front_matter: bool,
	no_directives: bool,
	max_concurrency: Option<usize>,
	width: Option<usize>,
}

impl FmtOverrides {
	fn apply(&self, options: &mut FormatOptions) {
		options.remove_front_matter |= self.remove_front_matter;
		options.directives &= !self.no_directives;
		if let Some(max_concurrency) = self.max_concurrency {
			options.max_concurrency = max_concurrency;
		}
		if let Some(width) = self.width {
			options.width = width;
		}
	}
}

async fn run_fmt(
	args: &MdtidyCli,
	paths: &[PathBuf],
	check: bool,
	overrides: &FmtOverrides,
	cancel: CancellationToken,
) -> miette::Result<Status> {
	let root = resolve_root(args);
	let mut options = load_options(&root)?;
	overrides.apply(&mut options);

	let files = discover_markdown_files(&root, paths, &options)?;
	if files.is_empty() {
		println!("No markdown files found.");
		return Ok(Status::Clean);
	}

	let count = files.len();
	let formatter = Formatter::from_options(&options);
	let batch = BatchOptions {
		cancel,
		max_concurrency: options.max_concurrency,
	};

	if !check {
		format_files(&formatter, files, &batch).await?;
		println!("Formatted {count} markdown file(s).");
		return Ok(Status::Clean);
	}

	let diffs = check_files(&formatter, files, &batch).await?;
	if diffs.is_empty() {
		println!("{diffs}");
		return Ok(Status::Clean);
	}

	print_diffs(&diffs, &root);
	eprintln!(
		"{} {} of {count} markdown file(s) not formatted. Run `mdtidy fmt` to fix.",
		colored!("error:", red),
		diffs.len()
	);

	Ok(Status::Unformatted)
}

async fn run_gen(
	args: &MdtidyCli,
	location: &str,
	cancel: CancellationToken,
) -> miette::Result<Status> {
	let root = resolve_root(args);
	let options = load_options(&root)?;
	let mut location: TypeLocation = location.parse()?;

	let relative = root.join(&location.location);
	if relative.is_file() {
		location.location = relative.display().to_string();
	}

	let sample = tokio::task::spawn_blocking(move || {
		generate_sample(&cancel, &options.cargo, &location)
	})
	.await
	.map_err(|e| MdtidyError::Task(e.to_string()))??;

	print!("{sample}");

	Ok(Status::Clean)
}

fn print_diffs(diffs: &Diffs, root: &Path) {
	for diff in diffs.iter() {
		println!(
			"{}",
			colored!(make_relative(&diff.path, root), bold)
		);

		for line in diff.unified.lines() {
			if line.starts_with("---") || line.starts_with("+++") {
				println!("{}", colored!(line, bold));
			} else if line.starts_with("@@") {
				println!("{}", colored!(line, cyan));
			} else if line.starts_with('+') {
				println!("{}", colored!(line, green));
			} else if line.starts_with('-') {
				println!("{}", colored!(line, red));
			} else {
				println!("{line}");
			}
		}
	}
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
