//! Inspect and convert serialized assets.
//!
//! ```text
//! asset-tool dump scene.bin
//! asset-tool convert scene.bin scene.ron
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use redlilium_serialize::{
    BinaryReader, BinaryWriter, Format, OutputConfig, SerializeError, TextReader, TextWriter,
    Token, TokenReader, TokenWriter, load_or_default, transcode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliFormat {
    Binary,
    Text,
}

impl From<CliFormat> for Format {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Binary => Format::Binary,
            CliFormat::Text => Format::Text,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "asset-tool", about = "Inspect and convert serialized assets", version)]
struct Cli {
    /// Pipeline config providing extensions and text layout.
    #[arg(long, global = true, default_value = "pipeline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the token stream of an asset, one token per line.
    Dump {
        file: PathBuf,
        /// Override the format inferred from the extension.
        #[arg(long, value_enum)]
        format: Option<CliFormat>,
    },
    /// Copy an asset's token stream into another format.
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum)]
        from: Option<CliFormat>,
        #[arg(long, value_enum)]
        to: Option<CliFormat>,
    },
}

fn open_reader(path: &Path, format: Format) -> Result<Box<dyn TokenReader>, SerializeError> {
    let source = BufReader::new(File::open(path)?);
    let reader: Box<dyn TokenReader> = match format {
        Format::Binary => Box::new(BinaryReader::new(source)),
        Format::Text => Box::new(TextReader::from_reader(source)?),
    };
    Ok(reader)
}

fn describe(token: &Token) -> String {
    match token {
        Token::String(s) => format!("String {s:?}"),
        Token::PropertyName(name) => format!("PropertyName {name:?}"),
        Token::ObjectStart(Some(type_id)) => format!("ObjectStart <{type_id}>"),
        Token::ObjectStart(None) => "ObjectStart".into(),
        Token::ArrayStart(len) => format!("ArrayStart [{len}]"),
        Token::Decimal(value) => format!("Decimal {value}"),
        Token::Null | Token::ObjectEnd | Token::ArrayEnd => token.kind().name().into(),
        other => {
            let debug = format!("{other:?}");
            let payload = debug
                .split_once('(')
                .map(|(_, rest)| rest.trim_end_matches(')'))
                .unwrap_or_default();
            format!("{} {payload}", other.kind().name())
        }
    }
}

fn dump(reader: &mut dyn TokenReader, out: &mut impl Write) -> Result<usize, SerializeError> {
    let mut depth = 0usize;
    let mut count = 0;
    while let Some(token) = reader.next_token()? {
        if matches!(token, Token::ObjectEnd | Token::ArrayEnd) {
            depth = depth.saturating_sub(1);
        }
        writeln!(out, "{:indent$}{}", "", describe(&token), indent = depth * 2)?;
        if matches!(token, Token::ObjectStart(_) | Token::ArrayStart(_)) {
            depth += 1;
        }
        count += 1;
    }
    Ok(count)
}

fn resolve_format(path: &Path, explicit: Option<CliFormat>, output: &OutputConfig) -> Format {
    explicit
        .map(Format::from)
        .unwrap_or_else(|| output.format_for(path))
}

fn run(cli: Cli) -> Result<(), SerializeError> {
    let config = load_or_default(&cli.config);
    match cli.command {
        Command::Dump { file, format } => {
            let format = resolve_format(&file, format, &config.output);
            let mut reader = open_reader(&file, format)?;
            let stdout = io::stdout();
            let count = dump(reader.as_mut(), &mut stdout.lock())?;
            log::info!("{count} tokens in {}", file.display());
        }
        Command::Convert {
            input,
            output,
            from,
            to,
        } => {
            let from = resolve_format(&input, from, &config.output);
            let to = resolve_format(&output, to, &config.output);
            if from == Format::Text && to == Format::Binary {
                log::warn!("text numbers are widened to Int64/Double in binary output");
            }
            let mut reader = open_reader(&input, from)?;
            let sink = BufWriter::new(File::create(&output)?);
            let mut writer: Box<dyn TokenWriter> = match to {
                Format::Binary => Box::new(BinaryWriter::new(sink)),
                Format::Text => Box::new(TextWriter::with_style(sink, config.output.text_style())),
            };
            let count = transcode(reader.as_mut(), writer.as_mut())?;
            log::info!(
                "Converted {} -> {} ({count} tokens)",
                input.display(),
                output.display()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_indents_nested_tokens() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_object_start(Some("Circle")).unwrap();
        writer.write_property_name("radius").unwrap();
        writer.write_f32(1.5).unwrap();
        writer.write_object_end().unwrap();
        let bytes = writer.into_inner();

        let mut out = Vec::new();
        let count = dump(&mut BinaryReader::new(bytes.as_slice()), &mut out).unwrap();
        assert_eq!(count, 4);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "ObjectStart <Circle>\n  PropertyName \"radius\"\n  Single 1.5\nObjectEnd\n"
        );
    }

    #[test]
    fn cli_parses_convert() {
        let cli = Cli::parse_from(["asset-tool", "convert", "a.bin", "b.ron", "--to", "text"]);
        assert!(matches!(
            cli.command,
            Command::Convert { to: Some(CliFormat::Text), from: None, .. }
        ));
    }
}
