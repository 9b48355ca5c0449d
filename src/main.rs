mod bytecode;
mod frontend;
mod runtime;

use std::{env, fs, path::Path, process};

use log::{LevelFilter, debug};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use crate::bytecode::ProgramImage;
use crate::bytecode::assemble::Assembler;
use crate::bytecode::disasm;
use crate::frontend::parser::Parser;
use crate::runtime::io::StdIo;
use crate::runtime::vm::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();

    let disasm_only = args.contains(&"--disasm".to_string());
    let emit = args.contains(&"--emit".to_string());
    let verbose = args.contains(&"--verbose".to_string()) || args.contains(&"-v".to_string());

    init_logger(verbose);

    // first non-flag argument is the filename
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    match filename {
        Some(filename) => run_file(filename, disasm_only, emit),
        None => print_usage(),
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

fn print_usage() {
    println!("cinder - a labeled stack-machine VM");
    println!();
    println!("Usage:");
    println!("  cinder <file>             Assemble and run a program");
    println!("  cinder <file.img>         Run a pre-assembled image");
    println!("  cinder --disasm <file>    Print the listing instead of running");
    println!("  cinder --emit <file>      Assemble and write <file>.img");
    println!("  cinder --verbose <file>   Debug-level logging");
}

fn run_file(filename: &str, disasm_only: bool, emit: bool) {
    let image = if Path::new(filename).extension().and_then(|e| e.to_str()) == Some("img") {
        load_image(filename)
    } else {
        assemble_file(filename)
    };

    if disasm_only {
        disasm::print_image(&image);
        return;
    }

    if emit {
        emit_image(filename, &image);
        return;
    }

    let mut vm = Vm::new(image);
    let mut io = StdIo;
    if let Err(e) = vm.run(&mut io) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn assemble_file(filename: &str) -> ProgramImage {
    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    let lines = match Parser::new(&source).parse() {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("load error: {}", e);
            process::exit(1);
        }
    };

    let image = match Assembler::new().assemble(&lines) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    debug!("assembled {} instructions", image.len());
    image
}

fn load_image(filename: &str) -> ProgramImage {
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    let image = match ProgramImage::from_bytes(&bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("load error: '{}' is not a valid image: {}", filename, e);
            process::exit(1);
        }
    };

    if let Err(e) = image.validate() {
        eprintln!("{}", e);
        process::exit(1);
    }

    debug!("loaded image with {} instructions", image.len());
    image
}

fn emit_image(filename: &str, image: &ProgramImage) {
    let out_path = Path::new(filename).with_extension("img");

    let bytes = match image.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to serialize '{}': {}", filename, e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(&out_path, bytes) {
        eprintln!("Failed to write '{}': {}", out_path.display(), e);
        process::exit(1);
    }

    debug!("wrote {}", out_path.display());
}
