use gruemap::config::MapperConfig;
use gruemap::dictionary::Dictionary;
use gruemap::pipeline::{extract_map, extract_map_validated};
use gruemap::story::StoryImage;
use gruemap::validate::RoutineReferenceValidator;
use log::{debug, info};
use std::env;
use std::fs::File;
use std::io::prelude::*;

fn print_usage(program: &str) {
    println!("gruemap - recover room maps from Z-Machine story files");
    println!();
    println!(
        "Usage: {} <story_file> [--config <file.toml>] [--toml] [--validate]",
        program
    );
    println!("Examples:");
    println!("  {} zork1.z3", program);
    println!("  {} zork1.z3 --toml > zork1-map.toml", program);
    println!("  {} zork1.z3 --config heuristics.toml --validate", program);
    println!();
    println!("--config  override heuristic constants from a TOML file");
    println!("--toml    print the report as TOML instead of text");
    println!("--validate  cross-check exits against room action routines");
}

fn read_story(path: &str) -> Vec<u8> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => {
                    eprintln!("Error: Story file not found: {}", path);
                    eprintln!();
                    eprintln!("Please check:");
                    eprintln!("• File path is correct");
                    eprintln!("• You're running from the right directory");
                }
                std::io::ErrorKind::PermissionDenied => {
                    eprintln!("Error: Permission denied accessing story file: {}", path);
                }
                _ => {
                    eprintln!("Error: Cannot open story file '{}': {}", path, e);
                }
            }
            std::process::exit(1);
        }
    };
    let mut data = Vec::new();
    if let Err(e) = file.read_to_end(&mut data) {
        eprintln!("Error: Cannot read story file '{}': {}", path, e);
        std::process::exit(1);
    }
    data
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        return Ok(());
    }

    let story_path = &args[1];
    let mut config_path = None;
    let mut as_toml = false;
    let mut validate = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config needs a file name")?;
                config_path = Some(path.clone());
            }
            "--toml" => as_toml = true,
            "--validate" => validate = true,
            other => {
                eprintln!("Error: Unknown option '{}'", other);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => match MapperConfig::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                eprintln!("Error: Cannot use configuration '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => MapperConfig::default(),
    };
    debug!("{:?}", config);

    let image = match StoryImage::from_memory(read_story(story_path)) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: '{}' is not a story file: {}", story_path, e);
            std::process::exit(1);
        }
    };

    let report = if validate {
        let validator = RoutineReferenceValidator::new(&config);
        extract_map_validated(&image, &config, &validator)
    } else {
        extract_map(&image, &config)
    };

    if as_toml {
        print!("{}", report.to_toml()?);
    } else {
        println!("{}", image.header);
        if let Ok(dictionary) = Dictionary::new(&image) {
            println!("{}\n", dictionary);
        }
        print!("{}", report);
    }
    Ok(())
}
