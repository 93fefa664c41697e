use anyhow::{Context, Result};
use serde_json::json;
use std::env;

use rolesync::{
    FileLogger, JsonFileSettings, MemoryLogger, SqliteStore, StaticSettings, SyncEngine, VERSION,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "demo" {
        return run_demo();
    }

    if args.len() < 4 {
        print_usage();
        std::process::exit(1);
    }

    let store = SqliteStore::open(&args[1])?;
    let settings = JsonFileSettings::new(&args[2]);
    let logger = FileLogger::new("rolesync.log");
    let engine = SyncEngine::new(&settings, &store, &store, &store, &logger);

    match args[3].as_str() {
        "check" => {
            let contact_id: i64 = parse_id(&args, 4, "contact id")?;
            match engine.check_contact(contact_id)? {
                None => println!("Not configured; nothing to check."),
                Some(verdict) => {
                    println!("Contact {}: {}", contact_id, verdict.describe());
                    println!("Eligible: {}", verdict.is_eligible());
                }
            }
        }
        "login" => {
            let user_id: i64 = parse_id(&args, 4, "user id")?;
            engine.handle_login(user_id)?;
            let roles = store.user_roles(user_id)?;
            println!("Synced user {} on login; roles now: {:?}", user_id, roles);
        }
        "sync" => {
            let mut contact_ids = Vec::new();
            for arg in &args[4..] {
                contact_ids.push(
                    arg.parse()
                        .with_context(|| format!("Invalid contact id: {}", arg))?,
                );
            }
            if contact_ids.is_empty() {
                print_usage();
                std::process::exit(1);
            }
            engine.sync_contacts(&contact_ids)?;
            println!("Synced {} contact(s)", contact_ids.len());
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn parse_id(args: &[String], index: usize, what: &str) -> Result<i64> {
    let arg = args.get(index).with_context(|| format!("Missing {}", what))?;
    arg.parse()
        .with_context(|| format!("Invalid {}: {}", what, arg))
}

fn print_usage() {
    eprintln!("rolesync {} - membership-driven role synchronization", VERSION);
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  rolesync demo");
    eprintln!("  rolesync <db> <settings.json> check <contact-id>");
    eprintln!("  rolesync <db> <settings.json> login <user-id>");
    eprintln!("  rolesync <db> <settings.json> sync <contact-id>...");
}

/// Seed a small in-memory CRM, run one sync, and show the decisions.
fn run_demo() -> Result<()> {
    println!("rolesync {} demo", VERSION);
    println!("----------------------------------------");

    let store = SqliteStore::open_in_memory()?;
    store.insert_status(1, "Current", true)?;
    store.insert_status(2, "Pending", false)?;
    store.insert_status(3, "Expired", false)?;

    // Contact 1: current primary membership.
    store.insert_membership(100, 1, 10, 1, None)?;
    // Contact 2: membership not yet current, payment still pending.
    store.insert_membership(101, 2, 10, 2, None)?;
    store.insert_contribution(500, "Pending")?;
    store.insert_membership_payment(101, 500)?;
    // Contact 3: no membership, employed by contact 1.
    store.insert_relationship(1, 3, 1, 5, true, true)?;
    // Contact 4: expired membership, no pending payment.
    store.insert_membership(102, 4, 10, 3, None)?;

    for (user_id, login, contact_id) in
        [(11, "alice", 1), (12, "bob", 2), (13, "carol", 3), (14, "dora", 4)]
    {
        store.insert_user(user_id, login)?;
        store.map_identity(user_id, contact_id)?;
    }

    let settings = StaticSettings(Some(json!({
        "role": "member",
        "membership_type_ids": [10],
        "logging": true,
    })));
    let logger = MemoryLogger::new();
    let engine = SyncEngine::new(&settings, &store, &store, &store, &logger);
    engine.sync_contacts(&[1, 2, 3, 4])?;

    println!("Platform users after sync:");
    for (user_id, login, roles) in store.users()? {
        println!("  {:>3}  {:<8} roles: {:?}", user_id, login, roles);
    }

    println!();
    println!("Decision log:");
    for line in logger.lines() {
        println!("  {}", line);
    }

    Ok(())
}
