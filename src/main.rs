extern crate wrsrc;

use std::{
    fs::File,
    io::{stdout, BufWriter, Write},
    path::Path,
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use wrsrc::{AccessFlags, ResourceStream};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Raw dump of a PE resource (.rsrc) section.
    target: String,

    #[arg(short, long, value_enum, default_value_t = Default::default(), help="Output format")]
    format: OutputFormat,

    #[arg(short, long, help="Output file. [default: stdout]")]
    output: Option<String>,

    #[arg(short='b', long, default_value="0", value_parser=parse_virtual_address,
        help="Virtual address the section is mapped at.")]
    base_va: u32,

    #[arg(short, long, default_value_t=1252, help="ASCII codepage for message table strings.")]
    codepage: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Default)]
enum OutputFormat {
    #[cfg(feature = "json")]
    JSON,

    #[default]
    TEXT,
}

fn parse_virtual_address(arg: &str) -> Result<u32, String> {
    let parsed = match arg.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.map_err(|err| format!("invalid virtual address `{arg}`: {err}"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let binpath = Path::new(&args.target);
    if !binpath.is_file() {
        eprintln!("Target is not a file.");
        return ExitCode::from(1);
    }

    let mut stream = ResourceStream::new();
    if let Err(err) = stream.set_virtual_address(args.base_va) {
        eprintln!("{err}");
        return ExitCode::from(2);
    }
    if let Err(err) = stream.set_ascii_codepage(args.codepage) {
        eprintln!("{err}");
        return ExitCode::from(2);
    }

    if let Err(err) = stream.open(binpath, AccessFlags::READ) {
        eprintln!("Failed to open `{}`: {err}", binpath.display());
        return ExitCode::from(3);
    }

    let mut out = BufWriter::new(match args.output {
        Some(ref x) => match File::create(Path::new(x)) {
            Ok(file) => Box::new(file) as Box<dyn Write>,
            Err(err) => {
                eprintln!("Failed to create `{x}`: {err}");
                return ExitCode::from(4);
            }
        },
        None => Box::new(stdout()) as Box<dyn Write>,
    });

    let result = match args.format {
        #[cfg(feature = "json")]
        OutputFormat::JSON => write_json(&stream, &mut out),
        OutputFormat::TEXT => write_text(&stream, &mut out),
    };

    if let Err(err) = result {
        eprintln!("Failed to write output: {err}");
        return ExitCode::from(5);
    }

    ExitCode::SUCCESS
}

#[cfg(feature = "json")]
fn write_json(stream: &ResourceStream, out: &mut impl Write) -> std::io::Result<()> {
    let Some(root) = stream.root() else {
        return Ok(());
    };
    let jstr = serde_json::to_string_pretty(root)?;
    writeln!(out, "{jstr}")
}

fn write_text(stream: &ResourceStream, out: &mut impl Write) -> std::io::Result<()> {
    let Some(root) = stream.root() else {
        return Ok(());
    };

    let mut tree = String::new();
    wrsrc::rsrc::tree::display_resource_tree(root, &mut tree, "  ", 0)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
    write!(out, "{tree}")?;

    writeln!(out)?;
    for resource in stream.resources() {
        match resource.name_utf8() {
            Some(name) => writeln!(out, "Resource `{name}` ({})", resource.kind())?,
            None => writeln!(out, "Resource {} ({})", resource.identifier().unwrap_or(0), resource.kind())?,
        }
        for item in resource.items() {
            writeln!(out, "  Item {:?}, {} languages", item.identifier(), item.number_of_sub_items())?;
            for leaf in item.sub_items() {
                writeln!(out, "    Language {:#06x}: {} bytes", leaf.identifier().unwrap_or(0), leaf.size())?;
            }
        }
    }

    Ok(())
}
