#![deny(unsafe_code)]
//! CLI binary for offline GLSL checking.
//!
//! Subcommands:
//! - `check <FILES>...` compile and link shader files, print active uniforms
//! - `manifest <PATH>` same, from a JSON program manifest
//! - `stages` list stage kinds and their file extensions

mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use shaderkit_core::{
    init_logging, HeadlessBackend, LoggingConfig, ProgramBuilder, ProgramManifest, ShaderProgram,
    ShaderSource, StageKind,
};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "shaderkit", about = "Compile and link GLSL programs without a GPU")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Log driver calls at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and link shader files into one program.
    Check {
        /// Shader files; the stage is inferred from the extension.
        files: Vec<PathBuf>,

        /// Vertex shader with a non-standard extension.
        #[arg(long)]
        vert: Vec<PathBuf>,

        /// Fragment shader with a non-standard extension.
        #[arg(long)]
        frag: Vec<PathBuf>,

        /// Geometry shader with a non-standard extension.
        #[arg(long)]
        geom: Vec<PathBuf>,

        /// Tessellation control shader.
        #[arg(long)]
        tesc: Vec<PathBuf>,

        /// Tessellation evaluation shader.
        #[arg(long)]
        tese: Vec<PathBuf>,

        /// Program name used in output.
        #[arg(long)]
        label: Option<String>,
    },
    /// Compile and link the program described by a JSON manifest.
    Manifest {
        /// Manifest path; stage paths resolve relative to it.
        path: PathBuf,
    },
    /// List stage kinds and the file extensions they are inferred from.
    Stages,
}

/// Resolves `check` arguments into sources, positional files first.
fn collect_sources(
    files: Vec<PathBuf>,
    explicit: [(StageKind, Vec<PathBuf>); 5],
) -> Result<Vec<ShaderSource>, CliError> {
    let mut sources = files
        .into_iter()
        .map(ShaderSource::from_path)
        .collect::<Result<Vec<_>, _>>()?;
    for (kind, paths) in explicit {
        sources.extend(paths.into_iter().map(|p| ShaderSource::file(kind, p)));
    }
    if sources.is_empty() {
        return Err(CliError::Input("no shader files given".into()));
    }
    Ok(sources)
}

fn report(
    gl: &HeadlessBackend,
    program: &ShaderProgram<'_, HeadlessBackend>,
    sources: &[ShaderSource],
    json: bool,
) -> Result<(), CliError> {
    let uniforms = program
        .handle()
        .map(|h| gl.active_uniforms(h))
        .unwrap_or_default();
    let label = program.config().display_label();

    if json {
        let info = serde_json::json!({
            "label": label,
            "stages": sources
                .iter()
                .map(|s| serde_json::json!({"stage": s.kind(), "source": s.describe()}))
                .collect::<Vec<_>>(),
            "uniforms": uniforms
                .iter()
                .map(|u| serde_json::json!({"name": u.name, "type": u.ty, "location": u.location}))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{label}: linked {} stage(s)", sources.len());
        for source in sources {
            println!("  {:<24} {}", source.kind().to_string(), source.describe());
        }
        if uniforms.is_empty() {
            println!("no active uniforms");
        } else {
            println!("active uniforms:");
            for u in &uniforms {
                println!("  {:>3}  {:<8} {}", u.location, u.ty, u.name);
            }
        }
    }
    Ok(())
}

fn build_and_report(
    gl: &HeadlessBackend,
    builder: ProgramBuilder<'_, HeadlessBackend>,
    sources: &[ShaderSource],
    json: bool,
) -> Result<(), CliError> {
    let program = builder.build()?;
    report(gl, &program, sources, json)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let gl = HeadlessBackend::new();

    match cli.command {
        Command::Stages => {
            if cli.json {
                let info: Vec<_> = StageKind::ALL
                    .iter()
                    .map(|k| serde_json::json!({"stage": k, "extensions": k.extensions()}))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                for kind in StageKind::ALL {
                    println!("{:<24} {}", kind.name(), kind.extensions().join(", "));
                }
            }
        }
        Command::Check {
            files,
            vert,
            frag,
            geom,
            tesc,
            tese,
            label,
        } => {
            let sources = collect_sources(
                files,
                [
                    (StageKind::Vertex, vert),
                    (StageKind::TessControl, tesc),
                    (StageKind::TessEvaluation, tese),
                    (StageKind::Geometry, geom),
                    (StageKind::Fragment, frag),
                ],
            )?;
            log::debug!("checking {} source(s)", sources.len());
            let mut builder = sources
                .iter()
                .cloned()
                .fold(ProgramBuilder::new(&gl), ProgramBuilder::source);
            if let Some(label) = label {
                builder = builder.label(label);
            }
            build_and_report(&gl, builder, &sources, cli.json)?;
        }
        Command::Manifest { path } => {
            let manifest = ProgramManifest::load(&path)?;
            let sources = manifest.sources()?;
            let mut builder = ProgramBuilder::from_manifest(&gl, &manifest)?;
            if manifest.program_config().label.is_none() {
                builder = builder.label(path.display().to_string());
            }
            build_and_report(&gl, builder, &sources, cli.json)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        env_filter: cli.verbose.then(|| "debug".to_string()),
        ..LoggingConfig::default()
    });

    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VS: &str = "#version 330 core\nuniform mat4 mvp;\nin vec3 aPos;\nvoid main() { gl_Position = mvp * vec4(aPos, 1.0); }\n";
    const FS: &str = "#version 330 core\nout vec4 color;\nuniform vec3 tint;\nvoid main() { color = vec4(tint, 1.0); }\n";

    fn no_explicit() -> [(StageKind, Vec<PathBuf>); 5] {
        StageKind::ALL.map(|kind| (kind, Vec::new()))
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    #[test]
    fn check_accepts_positional_and_explicit_stages() {
        let cli = parse(&["shaderkit", "--json", "check", "a.vs", "--frag", "b.glsl"]);
        assert!(cli.json);
        match cli.command {
            Command::Check { files, frag, .. } => {
                assert_eq!(files, vec![PathBuf::from("a.vs")]);
                assert_eq!(frag, vec![PathBuf::from("b.glsl")]);
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn collect_sources_rejects_unknown_extension() {
        let err = collect_sources(vec![PathBuf::from("shader.txt")], no_explicit()).unwrap_err();
        assert_eq!(err.exit_code(), 13);
    }

    #[test]
    fn collect_sources_requires_a_file() {
        let err = collect_sources(Vec::new(), no_explicit()).unwrap_err();
        assert_eq!(err.exit_code(), 13);
    }

    #[test]
    fn check_links_valid_pair() {
        let dir = tempfile::tempdir().unwrap();
        let vs = dir.path().join("basic.vert");
        let fs_path = dir.path().join("basic.frag");
        fs::write(&vs, VS).unwrap();
        fs::write(&fs_path, FS).unwrap();

        let cli = parse(&[
            "shaderkit",
            "check",
            vs.to_str().unwrap(),
            fs_path.to_str().unwrap(),
        ]);
        assert!(run(cli).is_ok());
    }

    #[test]
    fn check_reports_compile_failure_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let vs = dir.path().join("broken.vs");
        let fs_path = dir.path().join("basic.fs");
        fs::write(&vs, "#version 330 core\nvoid main() {\n").unwrap();
        fs::write(&fs_path, FS).unwrap();

        let cli = parse(&["shaderkit", "check", vs.to_str().unwrap(), fs_path.to_str().unwrap()]);
        let err = run(cli).err().unwrap_or_else(|| panic!("broken shader linked"));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn manifest_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let cli = parse(&["shaderkit", "manifest", path.to_str().unwrap()]);
        let err = run(cli).err().unwrap_or_else(|| panic!("missing manifest loaded"));
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn manifest_links_program() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p.vs"), VS).unwrap();
        fs::write(dir.path().join("p.fs"), FS).unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, r#"{"stages": [{"path": "p.vs"}, {"path": "p.fs"}]}"#).unwrap();

        let cli = parse(&["shaderkit", "--json", "manifest", path.to_str().unwrap()]);
        assert!(run(cli).is_ok());
    }
}
