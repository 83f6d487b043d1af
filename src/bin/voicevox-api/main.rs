
pub(crate) mod wav_output;

use voicevox_api::{
    self as vv, Backoff, CancellationToken, ClientConfig, Policy, RetryPolicy, SingleAttempt, SpeechPipeline,
    SpeechRequest, Voice, VoicevoxClient,
};

use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(about = "VOICEVOX engine API client", long_about = None, version)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    subcommand: Command,
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// Engine base URL
    #[arg(long, global = true, env = "VOICEVOX_BASE_URL", default_value = vv::DEFAULT_BASE_URL)]
    base_url: String,

    /// Whole-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Attempts per stage, including the first call
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Constant delay between attempts in milliseconds
    #[arg(long, global = true)]
    backoff_ms: Option<u64>,

    /// Call each endpoint once
    #[arg(long, global = true)]
    no_retry: bool,
}

#[derive(Debug, Args)]
struct VoiceArgs {
    /// Speaker (style) ID
    #[arg(long, default_value = "0")]
    speaker: u32,

    /// Preset ID; the query is created from the preset
    #[arg(long)]
    preset: Option<u32>,

    /// Core version
    #[arg(long)]
    core_version: Option<String>,

    /// Text to speak (read from stdin when omitted)
    #[arg(long)]
    text: Option<String>,
}

impl VoiceArgs {
    fn voice(&self) -> Voice {
        match self.preset {
            Some(preset_id) => Voice::Preset { preset_id, speaker: self.speaker },
            None => Voice::Speaker(self.speaker),
        }
    }

    fn read_text(&self) -> anyhow::Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        let mut text = String::new();
        let _ = std::io::stdin().read_to_string(&mut text)?;
        Ok(text.trim_end().to_string())
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Creates an audio query and prints it as JSON
    Query {
        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Synthesizes speech into a WAV file
    Synthesize {
        #[command(flatten)]
        voice: VoiceArgs,

        /// Raise the pitch at the end of questions
        #[arg(long)]
        upspeak: Option<bool>,

        /// Use the cancellable synthesis endpoint
        #[arg(long)]
        cancellable: bool,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    let mut config = ClientConfig::new(args.engine.base_url.clone());
    if let Some(secs) = args.engine.timeout_secs {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    vv::initialize(config)?;
    let client = VoicevoxClient::shared()?;
    log::debug!("Engine: {}", client.base_url());

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted. Cancelling...");
            canceller.cancel();
        }
    });

    if args.engine.no_retry {
        run(args.subcommand, client, SingleAttempt, SingleAttempt, &cancel).await
    } else {
        let query_policy = retry_policy(RetryPolicy::for_query_creation(), &args.engine);
        let synthesis_policy = retry_policy(RetryPolicy::for_synthesis(), &args.engine);
        run(args.subcommand, client, query_policy, synthesis_policy, &cancel).await
    }
}

fn retry_policy(mut policy: RetryPolicy, args: &EngineArgs) -> RetryPolicy {
    if let Some(max_attempts) = args.max_attempts {
        policy = policy.with_max_attempts(max_attempts);
    }
    if let Some(ms) = args.backoff_ms {
        policy = policy.with_backoff(Backoff::Constant(Duration::from_millis(ms)));
    }
    policy
}

async fn run<QP: Policy, SP: Policy>(
    command: Command,
    client: VoicevoxClient,
    query_policy: QP,
    synthesis_policy: SP,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let pipeline = SpeechPipeline::new(client, query_policy, synthesis_policy);

    match command {
        Command::Query { voice } => {
            let mut request = SpeechRequest::new(voice.read_text()?, voice.voice());
            request.core_version = voice.core_version;

            let query = pipeline.create_query(&request, cancel).await.into_result().inspect_err(log_failure)?;
            log::info!("Accent phrases: {}, moras: {}", query.accent_phrases.len(), query.mora_count());

            let mut json = query.to_json_pretty()?;
            json.push('\n');
            std::io::stdout().write_all(json.as_bytes())?;
        },

        Command::Synthesize { voice, upspeak, cancellable, output } => {
            let mut request = SpeechRequest::new(voice.read_text()?, voice.voice());
            request.core_version = voice.core_version;
            request.enable_interrogative_upspeak = upspeak;
            request.cancellable = cancellable;

            log::info!("Requesting speech: {}", request.text);
            let stream = pipeline.speak(&request, cancel).await.into_result().inspect_err(log_failure)?;
            let wav = stream.bytes().await?;

            let file_name = output
                .as_ref()
                .and_then(|path| path.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Synthesis.wav".to_string());
            wav_output::log_wav_info(&wav, &file_name)?;
            wav_output::write_wav(&wav, output.as_deref())?;
        },
    }

    Ok(())
}

fn log_failure(err: &vv::ClientError) {
    if err.is_retryable() {
        log::error!("Gave up on a retryable error: {}", err);
    } else {
        log::error!("{}", err);
    }
}
