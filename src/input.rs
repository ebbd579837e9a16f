// Gesture bridge input: serial line codec and reader
//
// The camera gesture bridge writes one "<mode>,<gesture>" line per frame:
//   1 = forward, 2 = backward, 0 = stop, 9 = idle

use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::messages::{ArmAction, ArmCommand};
use crate::motor::Mode;

const GESTURE_STOP: u8 = 0;
const GESTURE_FORWARD: u8 = 1;
const GESTURE_BACKWARD: u8 = 2;
const GESTURE_IDLE: u8 = 9;

const SERIAL_TIMEOUT_MS: u64 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Malformed gesture line: {0:?}")]
    Malformed(String),

    #[error("Unknown gesture code {0}")]
    UnknownGesture(u8),
}

/// Parse one gesture bridge line into a command
pub fn parse_gesture_line(line: &str) -> Result<ArmCommand, InputError> {
    let malformed = || InputError::Malformed(line.trim_end().to_string());

    let (mode, gesture) = line.trim().split_once(',').ok_or_else(malformed)?;
    let mode: Mode = mode.trim().parse().map_err(|_| malformed())?;
    let gesture: u8 = gesture.trim().parse().map_err(|_| malformed())?;

    let action = match gesture {
        GESTURE_FORWARD => ArmAction::Move { direction: 1 },
        GESTURE_BACKWARD => ArmAction::Move { direction: -1 },
        GESTURE_STOP => ArmAction::Stop,
        GESTURE_IDLE => ArmAction::Idle,
        other => return Err(InputError::UnknownGesture(other)),
    };
    Ok(ArmCommand::new(mode, action))
}

/// Read gesture lines from a serial port on a background thread.
/// Returns once the port is open; the thread exits when the receiver is dropped.
pub fn spawn_serial_reader(
    port_name: &str,
    baudrate: u32,
    tx: UnboundedSender<ArmCommand>,
) -> Result<(), serialport::Error> {
    let port = serialport::new(port_name, baudrate)
        .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()?;
    info!("Reading gesture commands from {} @ {} baud", port_name, baudrate);

    let name = port_name.to_string();
    std::thread::spawn(move || {
        let reason = read_gesture_lines(BufReader::new(port), &tx);
        warn!("Gesture input on {} stopped: {}", name, reason);
    });

    Ok(())
}

/// Why the gesture reader gave up
#[derive(Debug, thiserror::Error)]
pub enum ReaderExit {
    #[error("port closed")]
    Closed,

    #[error("runtime no longer listening")]
    ReceiverGone,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Forward every parseable line to `tx` until the source ends.
/// Bad bytes and malformed lines are logged and skipped; read timeouts are retried.
pub fn read_gesture_lines<R: BufRead>(mut reader: R, tx: &UnboundedSender<ArmCommand>) -> ReaderExit {
    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return ReaderExit::Closed,
            Ok(_) if buf.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&buf);
                match parse_gesture_line(&line) {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            return ReaderExit::ReceiverGone;
                        }
                    }
                    Err(e) => warn!("Ignoring serial input: {}", e),
                }
                buf.clear();
            }
            Ok(_) => {} // partial line, keep reading
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return ReaderExit::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_gesture_lines() {
        assert_eq!(
            parse_gesture_line("3,1\n").unwrap(),
            ArmCommand::new(3, ArmAction::Move { direction: 1 })
        );
        assert_eq!(
            parse_gesture_line("2,2\r\n").unwrap(),
            ArmCommand::new(2, ArmAction::Move { direction: -1 })
        );
        assert_eq!(
            parse_gesture_line("1,0").unwrap(),
            ArmCommand::new(1, ArmAction::Stop)
        );
        assert_eq!(
            parse_gesture_line(" 5 , 9 ").unwrap(),
            ArmCommand::new(5, ArmAction::Idle)
        );
    }

    #[test]
    fn test_parse_gesture_errors() {
        assert_eq!(
            parse_gesture_line("3,4"),
            Err(InputError::UnknownGesture(4))
        );
        assert!(matches!(
            parse_gesture_line("31"),
            Err(InputError::Malformed(_))
        ));
        assert!(matches!(
            parse_gesture_line("x,1"),
            Err(InputError::Malformed(_))
        ));
        assert!(matches!(
            parse_gesture_line("300,1"),
            Err(InputError::Malformed(_))
        ));
    }

    #[test]
    fn test_reader_skips_invalid_bytes() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let input: &[u8] = &[0xff, b'\n', b'3', b',', b'1', b'\n', b'1', b',', b'0', b'\n'];

        let exit = read_gesture_lines(Cursor::new(input), &tx);
        assert!(matches!(exit, ReaderExit::Closed));
        assert_eq!(
            rx.try_recv().unwrap(),
            ArmCommand::new(3, ArmAction::Move { direction: 1 })
        );
        assert_eq!(rx.try_recv().unwrap(), ArmCommand::new(1, ArmAction::Stop));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reader_skips_malformed_lines_and_drops_partial_tail() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let input = Cursor::new("garbage\n2,7\n5,2\n4,1");

        read_gesture_lines(input, &tx);
        assert_eq!(
            rx.try_recv().unwrap(),
            ArmCommand::new(5, ArmAction::Move { direction: -1 })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reader_stops_when_receiver_dropped() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let exit = read_gesture_lines(Cursor::new("3,1\n3,1\n"), &tx);
        assert!(matches!(exit, ReaderExit::ReceiverGone));
    }
}
