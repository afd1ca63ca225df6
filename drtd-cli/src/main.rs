use clap::Parser;
use color_eyre::eyre::Result;
use log::info;

use drtd_core::decoder::{registry, Decoder, SharedDecoder};
use drtd_core::errors::ConfigError;
use drtd_core::source::{input_names, SampleFormat, SampleSource, SoundCardSource, StdinSource};
use drtd_core::{store, ProcessingThread};

use std::sync::{Arc, Mutex};

#[derive(Parser, Debug)]
#[command(
    name = "drtd",
    about = "Decode digital radio transmissions from an audio stream",
    long_about = None
)]
struct Cli {
    /// Headless mode with the named decoder (case-insensitive).
    /// With no name: list decoders that support headless mode.
    #[arg(
        short = 'g',
        long = "headless",
        value_name = "Decoder",
        num_args = 0..=1,
        default_missing_value = ""
    )]
    headless: Option<String>,

    /// Audio input index; -1 lists available inputs
    #[arg(
        short = 'i',
        long = "input",
        value_name = "index",
        allow_negative_numbers = true
    )]
    input: Option<i32>,

    /// Read raw samples from stdin at the given sample rate
    #[arg(short = 's', long = "stdin", value_name = "rate")]
    stdin: Option<u32>,

    /// stdin samples are 16-bit signed (default 8-bit signed)
    #[arg(long = "s16")]
    s16: bool,

    /// stdin 16-bit samples are big-endian
    #[arg(long = "big-endian")]
    big_endian: bool,

    /// Verbose logging to stdout/stderr
    #[arg(short = 'v')]
    verbose: bool,

    /// Decoder parameters, passed to the decoder verbatim
    #[arg(trailing_var_arg = true, value_name = "Decoder parameters")]
    parameters: Vec<String>,
}

fn list_headless_decoders(decoders: &[Box<dyn Decoder>]) {
    let names: Vec<&str> = decoders
        .iter()
        .filter(|decoder| decoder.headless())
        .map(|decoder| decoder.name())
        .collect();
    println!("Available headless decoders: {}", names.join(", "));
}

fn print_parameter_schema(decoder: &dyn Decoder) {
    let parameters = decoder.changeable_parameters();
    if parameters.is_empty() {
        println!("Available settings: None");
    } else {
        let schema: Vec<String> = parameters.iter().map(|p| format!("[{p}]")).collect();
        println!("Available settings: {}", schema.join(" "));
    }
}

fn build_source(args: &Cli, decoder_rate: u32) -> Result<Box<dyn SampleSource>, ConfigError> {
    if let Some(rate) = args.stdin {
        if rate == 0 || rate > 65535 {
            return Err(ConfigError::InvalidSampleRate { rate });
        }
        let format = if args.s16 {
            SampleFormat::S16 {
                big_endian: args.big_endian,
            }
        } else {
            SampleFormat::S8
        };
        return Ok(Box::new(StdinSource::new(rate, format)));
    }

    let index = match args.input {
        Some(index) if index >= 0 => {
            let available = input_names().len();
            let index = index as usize;
            if index >= available {
                return Err(ConfigError::InvalidInputIndex { index, available });
            }
            Some(index)
        }
        _ => None,
    };
    Ok(Box::new(SoundCardSource::new(index, decoder_rate)))
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    if matches!(args.input, Some(index) if index < 0) {
        let names = input_names();
        if names.is_empty() {
            println!("No audio inputs available");
        } else {
            println!("Available inputs:");
            for (index, name) in names.iter().enumerate() {
                println!("\t{index}: {name}");
            }
        }
        return Ok(());
    }

    let mut decoders = registry();

    let Some(requested) = args.headless.as_deref() else {
        eprintln!("Headless mode is required: specify a decoder with -g/--headless");
        list_headless_decoders(&decoders);
        std::process::exit(1);
    };

    if requested.is_empty() {
        list_headless_decoders(&decoders);
        return Ok(());
    }

    let position = decoders
        .iter()
        .position(|decoder| decoder.name().eq_ignore_ascii_case(requested));
    let Some(position) = position else {
        eprintln!(
            "{}",
            ConfigError::UnknownDecoder {
                name: requested.to_string()
            }
        );
        list_headless_decoders(&decoders);
        std::process::exit(1);
    };
    let mut decoder = decoders.swap_remove(position);
    if !decoder.headless() {
        eprintln!(
            "{}",
            ConfigError::HeadlessUnsupported {
                name: decoder.name().to_string()
            }
        );
        list_headless_decoders(&decoders);
        std::process::exit(1);
    }

    let expected = decoder.changeable_parameters().len();
    if expected != args.parameters.len() {
        eprintln!(
            "{}",
            ConfigError::ParameterCountMismatch {
                expected,
                actual: args.parameters.len()
            }
        );
        print_parameter_schema(decoder.as_ref());
        std::process::exit(2);
    }
    if !decoder.setup_parameters(&args.parameters) {
        eprintln!("{}", ConfigError::InvalidParameters);
        print_parameter_schema(decoder.as_ref());
        std::process::exit(2);
    }

    if let Ok(executable) = std::env::current_exe() {
        if let Err(error) = store::open(&executable) {
            eprintln!("Fatal: could not read settings file: {error}");
            std::process::exit(1);
        }
    }

    info!("starting decoder \"{}\"", decoder.name());
    if let Err(error) = decoder.setup() {
        eprintln!("Could not start decoder: {error}");
        std::process::exit(1);
    }

    let source = match build_source(&args, decoder.input_sample_rate()) {
        Ok(source) => source,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };

    let shared: SharedDecoder = Arc::new(Mutex::new(decoder));
    let mut thread = match ProcessingThread::start(Arc::clone(&shared), source) {
        Ok(thread) => thread,
        Err(error) => {
            eprintln!("Could not start processing: {error}");
            std::process::exit(1);
        }
    };

    println!("Decoder ready.");
    thread.join();

    if let Ok(mut decoder) = shared.lock() {
        decoder.tear_down();
    }
    store::persist()?;
    Ok(())
}
