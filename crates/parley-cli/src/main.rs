use clap::{ArgAction, Parser, Subcommand};
use parley_agent::{
    AssistantProfiles, GENERAL_ASSISTANT, MagicText, RealtimeSession, SessionConfig, ToolCatalog,
    TurnResult, describe, parse_timeout_secs,
};
use parley_realtime::{AudioClip, BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "parley-cli")]
#[command(about = "Command-line host for realtime voice assistant sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the tools a session can select.
    Tools(ToolsArgs),
    /// List the assistant presets.
    Profiles,
    /// Show the magic variables, or expand a template with them.
    Magic(MagicArgs),
    /// Connect and run text or audio turns.
    Chat(ChatArgs),
}

#[derive(clap::Args, Debug)]
struct ToolsArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct MagicArgs {
    #[arg(long)]
    expand: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    #[arg(long, default_value = GENERAL_ASSISTANT)]
    assistant: String,
    #[arg(long)]
    instructions: Option<String>,
    #[arg(long)]
    voice: Option<String>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long = "tool")]
    tools: Vec<String>,
    #[arg(long = "text")]
    texts: Vec<String>,
    #[arg(long = "audio-file")]
    audio_files: Vec<PathBuf>,
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue)]
    show_log: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    show_history: bool,
    #[arg(long)]
    read_timeout_secs: Option<String>,
}

enum TurnInput {
    Text(String),
    Audio { source: PathBuf, clip: AudioClip },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Tools(args) => tools_command(args),
        Commands::Profiles => profiles_command(),
        Commands::Magic(args) => magic_command(args),
        Commands::Chat(args) => chat_command(args).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn tools_command(args: ToolsArgs) -> Result<ExitCode, String> {
    let catalog = ToolCatalog::discover();
    let mut definitions = Vec::new();
    for spec in catalog.specs() {
        match describe(spec) {
            Ok(descriptor) => definitions.push(descriptor.to_definition()),
            Err(error) => eprintln!("warning: skipping tool '{}': {error}", spec.name),
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&definitions).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        for definition in &definitions {
            println!("{}: {}", definition.name, definition.description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn profiles_command() -> Result<ExitCode, String> {
    for profile in AssistantProfiles::default().iter() {
        println!("{}", profile.name);
        println!("  voice: {}", profile.voice);
        let tools = if profile.tools.is_empty() {
            "<none>".to_string()
        } else {
            profile.tools.join(", ")
        };
        println!("  tools: {tools}");
        println!("  instructions: {}", profile.instructions);
    }
    Ok(ExitCode::SUCCESS)
}

fn magic_command(args: MagicArgs) -> Result<ExitCode, String> {
    let config = SessionConfig::from_env().map_err(|e| e.to_string())?;
    let magic = MagicText::with_defaults(config.user_location);
    match args.expand {
        Some(template) => println!("{}", magic.expand(&template)),
        None => println!("{}", magic.documentation()),
    }
    Ok(ExitCode::SUCCESS)
}

async fn chat_command(args: ChatArgs) -> Result<ExitCode, String> {
    let mut config = SessionConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(raw) = args.read_timeout_secs.as_deref() {
        config.read_timeout = parse_timeout_secs(raw).map_err(|e| e.to_string())?;
    }

    let mut inputs: Vec<TurnInput> = args.texts.iter().cloned().map(TurnInput::Text).collect();
    for path in &args.audio_files {
        inputs.push(TurnInput::Audio {
            source: path.clone(),
            clip: read_wav(path)?,
        });
    }

    let presets = AssistantProfiles::default();
    let profile = presets.get(&args.assistant).ok_or_else(|| {
        format!(
            "unknown assistant '{}', available: {}",
            args.assistant,
            presets.names().join(", ")
        )
    })?;

    tracing::debug!(
        assistant = %profile.name,
        turns = inputs.len(),
        url = %config.realtime_url,
        "starting chat"
    );
    let mut session = RealtimeSession::from_config(config).map_err(|e| e.to_string())?;
    report_rejected(session.apply_profile(profile).await.map_err(|e| e.to_string())?);
    if !args.tools.is_empty() {
        report_rejected(
            session
                .select_tools(&args.tools)
                .await
                .map_err(|e| e.to_string())?,
        );
    }
    if let Some(instructions) = args.instructions.clone() {
        session.set_instructions(instructions);
    }
    if let Some(voice) = args.voice.clone() {
        session.set_voice(voice).map_err(|e| e.to_string())?;
    }
    if let Some(temperature) = args.temperature {
        session
            .set_temperature(temperature)
            .map_err(|e| e.to_string())?;
    }

    if let Err(error) = session.connect().await {
        let _ = session.disconnect().await;
        return Err(error.to_string());
    }
    eprintln!("connected (session {})", session.session_id());

    let outcome = if inputs.is_empty() {
        run_interactive(&mut session, &args).await
    } else {
        run_scripted(&mut session, inputs, &args).await
    };

    let _ = session.disconnect().await;
    if args.show_history {
        println!("{}", session.render_tool_history());
    }
    if args.show_log {
        println!("{}", session.render_event_log());
    }
    outcome.map(|()| ExitCode::SUCCESS)
}

async fn run_scripted(
    session: &mut RealtimeSession,
    inputs: Vec<TurnInput>,
    args: &ChatArgs,
) -> Result<(), String> {
    for (index, input) in inputs.into_iter().enumerate() {
        let turn = match input {
            TurnInput::Text(text) => {
                println!("you: {text}");
                session.send_text(text).await
            }
            TurnInput::Audio { source, clip } => {
                println!("you: <audio {}>", source.display());
                session.send_audio(&clip.pcm).await
            }
        };
        let turn = turn.map_err(|e| e.to_string())?;
        report_turn(index + 1, &turn, args.out_dir.as_deref())?;
    }
    Ok(())
}

async fn run_interactive(session: &mut RealtimeSession, args: &ChatArgs) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut number = 0;
    while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }
        number += 1;
        match session.send_text(text).await {
            Ok(turn) => report_turn(number, &turn, args.out_dir.as_deref())?,
            Err(error) if error.is_connection_level() => return Err(error.to_string()),
            Err(error) => eprintln!("turn failed: {error}"),
        }
        if !session.is_connected() {
            return Err("session disconnected".to_string());
        }
    }
    Ok(())
}

fn report_turn(number: usize, turn: &TurnResult, out_dir: Option<&Path>) -> Result<(), String> {
    if !turn.transcript.is_empty() {
        println!("assistant: {}", turn.transcript);
    }
    if turn.tool_calls > 0 {
        println!("  ({} tool call(s))", turn.tool_calls);
    }
    if let (Some(dir), true) = (out_dir, turn.has_audio()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("failed creating '{}': {e}", dir.display()))?;
        let path = dir.join(format!("turn-{number}.wav"));
        write_wav(&path, &turn.audio)?;
        println!("  audio: {} ({} ms)", path.display(), turn.audio.duration_ms());
    }
    Ok(())
}

fn report_rejected(rejected: Vec<parley_agent::RejectedTool>) {
    for tool in rejected {
        eprintln!("warning: tool '{}' rejected: {}", tool.name, tool.error);
    }
}

/// Reads any PCM or float WAV as mono 16-bit audio at the session sample rate.
fn read_wav(path: &Path) -> Result<AudioClip, String> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| format!("failed reading WAV '{}': {e}", path.display()))?;
    let spec = reader.spec();
    let decode_error = |e: hound::Error| format!("failed decoding WAV '{}': {e}", path.display());
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_error)?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(decode_error)?
        }
    };

    let mono = downmix(&interleaved, spec.channels);
    let resampled = resample_linear(&mono, spec.sample_rate, SAMPLE_RATE);
    if spec.channels != CHANNELS || spec.sample_rate != SAMPLE_RATE {
        tracing::debug!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            "converted input audio to {SAMPLE_RATE} Hz mono"
        );
    }
    let samples: Vec<i16> = resampled
        .iter()
        .map(|sample| (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect();
    Ok(AudioClip::from_samples(&samples))
}

/// Averages interleaved frames down to one channel.
fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let step = f64::from(from_rate) / f64::from(to_rate);
    let last = samples.len() - 1;
    (0..out_len)
        .map(|index| {
            let position = index as f64 * step;
            let left = (position.floor() as usize).min(last);
            let right = (left + 1).min(last);
            let fraction = (position - left as f64) as f32;
            samples[left] + (samples[right] - samples[left]) * fraction
        })
        .collect()
}

fn write_wav(path: &Path, clip: &AudioClip) -> Result<(), String> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: clip.sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("failed writing WAV '{}': {e}", path.display()))?;
    for sample in clip.samples() {
        writer.write_sample(sample).map_err(|e| e.to_string())?;
    }
    writer.finalize().map_err(|e| e.to_string())
}
