use clap::Args;
use json::JsonEncoder;
use tlv::{TokenDecoder, TokenEncoder};
use tracing::{debug, info};
use transclaim::decoder::Decoder;
use transclaim::processor::{DEFAULT_MAX_DEPTH, Transcoder};
use transclaim::render::render;

use crate::claims::ArgumentDecoder;
use crate::error::Result;
use crate::utils::{read_input, write_output};

#[derive(Args)]
pub(crate) struct Config {
    /// Binary claim set to transcode. `-` reads from stdin
    #[arg(long = "in", value_name = "FILE", conflicts_with = "claims", required_unless_present = "claims")]
    input: Option<String>,

    /// Claim to encode, as LABEL:VALUE. May be repeated
    #[arg(short = 'c', long = "claim", value_name = "LABEL:VALUE")]
    claims: Vec<String>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
    out_format: OutputFormat,

    /// File to write. If not specified, writes to stdout
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    output: Option<String>,

    /// Deepest submodule nesting accepted
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Indent JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Binary tag-length-value claim set
    Tlv,
    /// JSON text
    Json,
}

pub(crate) fn execute(config: Config) -> Result<()> {
    let transcoder = Transcoder::new().max_depth(config.max_depth);

    let bytes = match config.input.as_deref() {
        Some(path) => {
            let input = read_input(Some(path))?;
            debug!(len = input.len(), "read claim set");
            let mut decoder = TokenDecoder::new(&input)?;
            encode(&transcoder, &mut decoder, &config)?
        }
        None => {
            let mut decoder = ArgumentDecoder::parse(config.claims.as_slice())?;
            encode(&transcoder, &mut decoder, &config)?
        }
    };

    // nothing is written unless the whole token was transcoded
    write_output(config.output.as_deref(), &bytes)?;
    info!(len = bytes.len(), format = ?config.out_format, "token written");
    Ok(())
}

fn encode<D: Decoder>(transcoder: &Transcoder, decoder: &mut D, config: &Config) -> Result<Vec<u8>> {
    let bytes = match config.out_format {
        OutputFormat::Tlv => render(transcoder, decoder, &mut TokenEncoder::new())?,
        OutputFormat::Json => {
            let mut text = if config.pretty {
                render(transcoder, decoder, &mut JsonEncoder::pretty())?
            } else {
                render(transcoder, decoder, &mut JsonEncoder::new())?
            };
            text.push(b'\n');
            text
        }
    };
    Ok(bytes)
}
