//! Subcommand implementations

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use cardpass::card::{CardSession, short_reader_name};
use cardpass::{DecryptRequest, PasswordFileDecryptor, Settings};
use cardpass_apdu_core::{ContextFactory, ReaderContext};
use cardpass_apdu_transport_pcsc::PcscContextFactory;
use eyre::WrapErr;
use tracing::{debug, info};

use crate::display;
use crate::prompt::TerminalPrompt;

/// Decrypt each file and write its plaintext to stdout
pub(crate) fn decrypt_command(
    settings: &Settings,
    reader: Option<String>,
    files: &[PathBuf],
    key_ids: &[String],
    no_cache: bool,
) -> eyre::Result<()> {
    let decryptor = PasswordFileDecryptor::from_settings(settings, TerminalPrompt)
        .with_caching(settings.pin_cache.enabled && !no_cache)
        .with_reader(reader);

    let mut stdout = io::stdout().lock();
    for path in files {
        let ciphertext =
            std::fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;

        let mut request = DecryptRequest::new(&ciphertext);
        if !key_ids.is_empty() {
            request = request.with_key_ids(key_ids);
        }

        match decryptor.decrypt(&request) {
            Ok(plaintext) => {
                info!(file = %path.display(), "Decrypted");
                stdout.write_all(&plaintext)?;
                stdout.flush()?;
            }
            Err(e) if e.is_cancelled() => {
                eprintln!("{}", display::warning("PIN entry cancelled"));
                return Ok(());
            }
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("failed to decrypt {}", path.display()));
            }
        }
    }
    Ok(())
}

/// List readers and whether they hold a card
pub(crate) fn readers_command(settings: &Settings) -> eyre::Result<()> {
    let context = PcscContextFactory::new(settings.pcsc.config()).establish()?;
    let readers = context.reader_status();
    context.release()?;
    let readers = readers?;

    if readers.is_empty() {
        println!("{}", display::info("No readers found"));
        return Ok(());
    }

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = if reader.card_present() {
            "card present"
        } else {
            "no card"
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }
    Ok(())
}

/// Show the decryption key of the OpenPGP card in each reader
pub(crate) fn status_command(settings: &Settings, only: Option<&str>) -> eyre::Result<()> {
    let factory = Arc::new(PcscContextFactory::new(settings.pcsc.config()));
    let mut session = CardSession::new(factory);
    session.establish_context()?;

    let readers = session.list_readers()?;
    let mut shown = 0;
    for reader in readers.iter().filter(|r| only.is_none_or(|name| name == r.as_str())) {
        shown += 1;
        let items = match card_status(&mut session, reader) {
            Ok(items) => items,
            Err(e) => {
                debug!(%reader, error = %e, "No usable OpenPGP card");
                vec![("Status", format!("no OpenPGP card ({e})"))]
            }
        };
        session.disconnect()?;
        println!("{}\n", display::key_value_box(short_reader_name(reader), &items));
    }

    session.release_context()?;
    if shown == 0 {
        println!("{}", display::info("No readers found"));
    }
    Ok(())
}

fn card_status(
    session: &mut CardSession<PcscContextFactory>,
    reader: &str,
) -> cardpass::card::Result<Vec<(&'static str, String)>> {
    session.connect(reader)?;
    session.select_applet()?;
    Ok(vec![
        ("Reader", reader.to_owned()),
        ("Key id", session.fetch_key_id()?),
        ("Key type", session.fetch_key_type()?.to_string()),
        ("PIN tries left", session.fetch_pin_tries_remaining()?.to_string()),
    ])
}
