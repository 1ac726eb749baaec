//! dSYM lookup helper for DebugSymbols.framework.
//!
//! The OS debug-symbol daemon invokes this with a binary's UUID as the sole
//! argument. The helper queries the build tooling's symbol cache database
//! and, when the recorded dSYM bundle still exists on disk, prints the
//! property list that maps the UUID to its dSYM path and architecture.
//! Exits 0 on a hit, 1 otherwise.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rusqlite::{Connection, OpenFlags};

/// Symbol cache database, relative to `$HOME`.
const DB_RELATIVE_PATH: &str = "Library/Application Support/machpatch/symbol_cache.db";

fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "dsym-lookup".into());
    let (Some(uuid), None) = (args.next(), args.next()) else {
        eprintln!("Usage: {program} UUID");
        return ExitCode::FAILURE;
    };

    match lookup(&uuid) {
        Ok(Some(plist)) => {
            print!("{plist}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn lookup(uuid: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let home = std::env::var_os("HOME").ok_or("HOME is not set")?;
    let db_path = PathBuf::from(home).join(DB_RELATIVE_PATH);

    let connection = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut statement = connection.prepare(
        "SELECT uuid, dsym_path, architecture FROM symbol_cache WHERE uuid = ?1 LIMIT 1",
    )?;

    let mut rows = statement.query([uuid])?;
    while let Some(row) = rows.next()? {
        let uuid: String = row.get(0)?;
        let dsym_path: String = row.get(1)?;
        let architecture: String = row.get(2)?;

        // A non-existent result would stop DebugSymbols.framework from
        // falling back to its Spotlight search.
        if !Path::new(&dsym_path).exists() {
            continue;
        }
        return Ok(Some(render_plist(&uuid, &dsym_path, &architecture)));
    }

    Ok(None)
}

/// Renders the DebugSymbols.framework lookup response.
fn render_plist(uuid: &str, dsym_path: &str, architecture: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
         \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n\
         <dict>\n\
         <key>{uuid}</key>\n\
         <dict>\n\
         <key>DBGArchitecture</key>\n\
         <string>{architecture}</string>\n\
         <key>DBGDSYMPath</key>\n\
         <string>{dsym_path}</string>\n\
         </dict>\n\
         </dict>\n\
         </plist>\n"
    )
}
