use std::io;

use thermistor_core::device::DEFAULT_CHANNEL_COUNT;
use thermistor_core::repl::grammar::FixtureKind;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

#[allow(dead_code)]
#[path = "../simulator.rs"]
mod simulator;

use session::{Session, transcript_path};

fn main() -> io::Result<()> {
    env_logger::init();
    for fixture in FixtureKind::ALL {
        record_fixture(fixture)?;
    }
    Ok(())
}

fn record_fixture(fixture: FixtureKind) -> io::Result<()> {
    let path = transcript_path(fixture);
    let mut session = Session::with_transcript(fixture, DEFAULT_CHANNEL_COUNT, &path)?;
    match fixture {
        FixtureKind::Populated => record_populated(&mut session)?,
        FixtureKind::Partial => record_partial(&mut session)?,
        FixtureKind::Absent => record_absent(&mut session)?,
        FixtureKind::Faulty => record_faulty(&mut session)?,
    }
    println!("recorded {}", path.display());
    Ok(())
}

fn record_populated(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("help")?;
    let _ = session.handle_command("table")?;
    let _ = session.handle_command("acquire")?;
    let _ = session.handle_command("acquire channels=16")?;
    let _ = session.handle_command("status")?;
    Ok(())
}

fn record_partial(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("acquire")?;
    let _ = session.handle_command("decode 0277 0xFFFF 0036")?;
    let _ = session.handle_command("status")?;
    Ok(())
}

fn record_absent(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("acquire retries=3")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("fixture populated")?;
    let _ = session.handle_command("acquire channels=4")?;
    Ok(())
}

fn record_faulty(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("acquire")?;
    let _ = session.handle_command("acquire retries=3")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("acquire channels=20")?;
    Ok(())
}
