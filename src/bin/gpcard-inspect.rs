//! Inspect a simulated GlobalPlatform card
//!
//! Loads a card profile, prints the registry and runs APDUs against the
//! card.
//!
//! Usage: gpcard-inspect [--profile-dir DIR | --sample] [--save] [APDU...]
//!
//! Each APDU is a hex string, for example:
//!   gpcard-inspect --sample 00A4040000 80F24000024F00

use std::env;
use std::path::PathBuf;
use std::process;

use gpcard_open::apdu::{hexify, Response};
use gpcard_open::registry::{EntityClass, EntityKind, Registry};
use gpcard_open::{CardProfile, CardSession, ProfileStore};

const USAGE: &str = "Usage: gpcard-inspect [--profile-dir DIR | --sample] [--save] [APDU...]";

struct Options {
    profile_dir: Option<PathBuf>,
    sample: bool,
    save: bool,
    apdus: Vec<Vec<u8>>,
}

fn main() {
    let options = match parse_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    let mut store = ProfileStore::new(options.profile_dir.clone());
    if options.sample {
        store.profile = CardProfile::sample();
    } else if !store.load() {
        println!("Using the default profile ({} not usable)", store.profile_file().display());
    }

    if options.save {
        if !store.save() {
            eprintln!("Error: could not save profile to {}", store.profile_file().display());
            process::exit(1);
        }
        println!("Saved profile to {}", store.profile_file().display());
    }

    let mut session = match CardSession::from_profile(&store.profile) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let atr = session.power_on();
    println!("ATR: {}", hexify(&atr));
    println!();
    print_registry(session.registry());

    if options.apdus.is_empty() {
        return;
    }
    println!();
    for apdu in &options.apdus {
        println!("> {}", hexify(apdu));
        let raw = session.process_apdu(apdu);
        match Response::from_bytes(&raw) {
            Some(response) => println!("< {}  [{}]", hexify(&raw), response),
            None => println!("< {}", hexify(&raw)),
        }
    }
    println!();
    print_registry(session.registry());
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        profile_dir: None,
        sample: false,
        save: false,
        apdus: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--profile-dir" => {
                let dir = args.next().ok_or("--profile-dir needs a directory")?;
                options.profile_dir = Some(PathBuf::from(dir));
            }
            "--sample" => options.sample = true,
            "--save" => options.save = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            hex_apdu => {
                let cleaned: String = hex_apdu.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = hex::decode(&cleaned)
                    .map_err(|e| format!("invalid APDU '{}': {}", hex_apdu, e))?;
                options.apdus.push(bytes);
            }
        }
    }
    Ok(options)
}

fn print_registry(registry: &Registry) {
    println!(
        "Card life cycle: {:02X}, {} of {} entries",
        registry.card_life_cycle_state(),
        registry.len(),
        registry.capacity()
    );
    println!("{:>3}  {:<6} {:<32} {:>5}  {:<32} {}", "#", "kind", "AID", "state", "associated SD", "privileges / services");

    for (index, record) in registry.iter() {
        let kind = match record.kind() {
            EntityKind::ExecutableLoadFile { .. } => "ELF",
            EntityKind::ExecutableModule { .. } => "EM",
            EntityKind::Instance { class, .. } => match class {
                EntityClass::IssuerSecurityDomain => "ISD",
                EntityClass::SecurityDomain => "SD",
                EntityClass::Application => "APP",
            },
        };
        let privileges: Vec<String> = record.privileges().iter().map(|p| format!("{:?}", p)).collect();
        let services: Vec<String> = record.global_services().map(|s| s.to_string()).collect();

        let mut extra = privileges.join(",");
        if !services.is_empty() {
            extra.push_str(&format!(" / {}", services.join(",")));
        }
        println!(
            "{:>3}  {:<6} {:<32} {:>5}  {:<32} {}",
            index,
            kind,
            record.aid().to_string(),
            format!("{:02X}", record.state()),
            record.parent().to_string(),
            extra
        );
    }

    let unique: Vec<String> = registry
        .unique_services()
        .iter()
        .map(|(owner, name)| format!("{}@{}", name, owner))
        .collect();
    if !unique.is_empty() {
        println!("Unique services: {}", unique.join(", "));
    }
}
