//! Panel microcontroller protocol
//!
//! Encodes panel commands into checksummed byte frames:
//! 2-byte command code, payload, then a 1-byte checksum.

use std::fmt;

/// Width of one LCD line in bytes
pub const LINE_WIDTH: usize = 80;

/// Total length of a display frame (code + two lines + checksum)
pub const DISPLAY_FRAME_LEN: usize = 2 + LINE_WIDTH * 2 + 1;

/// Button debounce rate sent with every button control command
pub const BUTTON_DEBOUNCE_RATE: u8 = 20;

/// Scroll rate in milliseconds
pub const SCROLL_RATE_MS: u8 = 10;

/// Characters shifted per scroll step
pub const SCROLL_CHAR_COUNT: u8 = 1;

const CMD_DISPLAY: [u8; 2] = [0xFF, 0x50];
const CMD_SCROLL: [u8; 2] = [0xFF, 0x51];
const CMD_BUTTON_CONTROL: [u8; 2] = [0xFF, 0x40];
const CMD_LAMP_TEST: [u8; 2] = [0xFF, 0x30];
const CMD_SOFT_RESET: [u8; 2] = [0xFF, 0x20];
const CMD_FLASH_UPDATE: [u8; 2] = [0xFF, 0x10];
const CMD_JUMP_TO_MAIN: [u8; 2] = [0xFF, 0x11];
const CMD_DISPLAY_VERSION: [u8; 2] = [0xFF, 0x60];

/// Lamp test parameters: all segments, 10 seconds
const LAMP_TEST_PARAMS: [u8; 2] = [0xFF, 0x0A];

/// Logical panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Button {
    Increment = 0x00,
    Decrement = 0x01,
    Execute = 0x02,
}

impl Button {
    /// All logical buttons, in the order they are configured at bring-up
    pub const ALL: [Button; 3] = [Button::Increment, Button::Decrement, Button::Execute];
}

/// How the microcontroller reports a held button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ButtonOperation {
    /// One event per press
    SingleExecution = 0x00,
    /// Repeat while held
    AutoRepeat = 0x01,
}

/// Scroll control for long display lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScrollControl {
    Stop = 0x00,
    Line1Left = 0x01,
    Line1Right = 0x02,
    Line2Left = 0x03,
    Line2Right = 0x04,
}

/// Commands understood by the panel microcontroller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    /// Show two lines of text; each is truncated or space-padded to 80 bytes
    Display { line1: Vec<u8>, line2: Vec<u8> },

    /// Configure how a button reports presses
    ButtonControl { button: Button, operation: ButtonOperation },

    /// Start or stop scrolling
    Scroll { control: ScrollControl },

    /// Light every segment and indicator
    LampTest,

    /// Restart the microcontroller firmware
    SoftReset,

    /// Enter the firmware update loader
    FlashUpdate,

    /// Leave the loader and start the main program
    JumpToMainProgram,

    /// Show the firmware version on the LCD
    DisplayVersion,
}

impl PanelCommand {
    /// 2-byte command code
    pub fn code(&self) -> [u8; 2] {
        match self {
            PanelCommand::Display { .. } => CMD_DISPLAY,
            PanelCommand::ButtonControl { .. } => CMD_BUTTON_CONTROL,
            PanelCommand::Scroll { .. } => CMD_SCROLL,
            PanelCommand::LampTest => CMD_LAMP_TEST,
            PanelCommand::SoftReset => CMD_SOFT_RESET,
            PanelCommand::FlashUpdate => CMD_FLASH_UPDATE,
            PanelCommand::JumpToMainProgram => CMD_JUMP_TO_MAIN,
            PanelCommand::DisplayVersion => CMD_DISPLAY_VERSION,
        }
    }

    /// Encode the command to a checksummed frame
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(DISPLAY_FRAME_LEN);
        frame.extend_from_slice(&self.code());

        match self {
            PanelCommand::Display { line1, line2 } => {
                push_line(&mut frame, line1);
                push_line(&mut frame, line2);
            }
            PanelCommand::ButtonControl { button, operation } => {
                frame.extend_from_slice(&[BUTTON_DEBOUNCE_RATE, *button as u8, *operation as u8]);
            }
            PanelCommand::Scroll { control } => {
                frame.extend_from_slice(&[*control as u8, SCROLL_RATE_MS, SCROLL_CHAR_COUNT]);
            }
            PanelCommand::LampTest => frame.extend_from_slice(&LAMP_TEST_PARAMS),
            PanelCommand::SoftReset
            | PanelCommand::FlashUpdate
            | PanelCommand::JumpToMainProgram
            | PanelCommand::DisplayVersion => {}
        }

        frame.push(checksum(&frame));
        frame
    }
}

impl fmt::Display for PanelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelCommand::Display { line1, line2 } => write!(
                f,
                "Display \"{}\" / \"{}\"",
                String::from_utf8_lossy(line1).trim_end(),
                String::from_utf8_lossy(line2).trim_end()
            ),
            PanelCommand::ButtonControl { button, operation } => {
                write!(f, "ButtonControl {:?} {:?}", button, operation)
            }
            PanelCommand::Scroll { control } => write!(f, "Scroll {:?}", control),
            PanelCommand::LampTest => write!(f, "LampTest"),
            PanelCommand::SoftReset => write!(f, "SoftReset"),
            PanelCommand::FlashUpdate => write!(f, "FlashUpdate"),
            PanelCommand::JumpToMainProgram => write!(f, "JumpToMainProgram"),
            PanelCommand::DisplayVersion => write!(f, "DisplayVersion"),
        }
    }
}

fn push_line(frame: &mut Vec<u8>, line: &[u8]) {
    let take = line.len().min(LINE_WIDTH);
    frame.extend_from_slice(&line[..take]);
    frame.resize(frame.len() + (LINE_WIDTH - take), b' ');
}

/// Running sum with end-around carry: whenever the sum overflows a byte,
/// the carry is folded back into the low byte.
pub fn end_around_sum(bytes: &[u8]) -> u8 {
    let mut sum: u16 = 0;
    for &b in bytes {
        sum += u16::from(b);
        if sum & 0xFF00 != 0 {
            sum = (sum & 0x00FF) + 1;
        }
    }
    sum as u8
}

/// Checksum byte for a frame body: two's complement of the end-around sum
pub fn checksum(bytes: &[u8]) -> u8 {
    (!end_around_sum(bytes)).wrapping_add(1)
}

/// Check the trailing checksum byte of a complete frame
pub fn verify(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&check, body)) => end_around_sum(body).wrapping_add(check) == 0,
        None => false,
    }
}

/// Display frame for two lines
pub fn display(line1: &[u8], line2: &[u8]) -> Vec<u8> {
    PanelCommand::Display {
        line1: line1.to_vec(),
        line2: line2.to_vec(),
    }
    .encode()
}

/// Button control frame
pub fn button_control(button: Button, operation: ButtonOperation) -> Vec<u8> {
    PanelCommand::ButtonControl { button, operation }.encode()
}

/// Scroll frame
pub fn scroll(control: ScrollControl) -> Vec<u8> {
    PanelCommand::Scroll { control }.encode()
}

/// Lamp test frame
pub fn lamp_test() -> Vec<u8> {
    PanelCommand::LampTest.encode()
}

/// Soft reset frame
pub fn soft_reset() -> Vec<u8> {
    PanelCommand::SoftReset.encode()
}

/// Flash update frame
pub fn flash_update() -> Vec<u8> {
    PanelCommand::FlashUpdate.encode()
}

/// Jump-to-main-program frame
pub fn jump_to_main_program() -> Vec<u8> {
    PanelCommand::JumpToMainProgram.encode()
}

/// Display version frame
pub fn display_version() -> Vec<u8> {
    PanelCommand::DisplayVersion.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_known_values() {
        assert_eq!(checksum(&[]), 0x00);
        assert_eq!(checksum(&[0x01]), 0xFF);
        // 0xFF + 0x50 = 0x14F -> 0x4F + 1 = 0x50
        assert_eq!(end_around_sum(&[0xFF, 0x50]), 0x50);
        assert_eq!(checksum(&[0xFF, 0x50]), 0xB0);
    }

    #[test]
    fn test_soft_reset_frame() {
        let frame = soft_reset();
        assert_eq!(frame, vec![0xFF, 0x20, 0xE0]);
        assert!(verify(&frame));
    }

    #[test]
    fn test_button_control_layout() {
        let frame = button_control(Button::Execute, ButtonOperation::SingleExecution);
        assert_eq!(&frame[..5], &[0xFF, 0x40, 20, 0x02, 0x00]);
        assert_eq!(frame.len(), 6);
        assert!(verify(&frame));
    }

    #[test]
    fn test_scroll_layout() {
        let frame = scroll(ScrollControl::Line1Left);
        assert_eq!(&frame[..5], &[0xFF, 0x51, 0x01, 10, 1]);
        assert!(verify(&frame));
    }

    #[test]
    fn test_fixed_frames() {
        assert_eq!(&lamp_test()[..4], &[0xFF, 0x30, 0xFF, 0x0A]);
        assert_eq!(flash_update().len(), 3);
        assert_eq!(jump_to_main_program().len(), 3);
        assert_eq!(display_version().len(), 3);
        for frame in [lamp_test(), flash_update(), jump_to_main_program(), display_version()] {
            assert!(verify(&frame));
        }
    }

    #[test]
    fn test_display_pads_short_lines() {
        let frame = display(b"01", b"");
        assert_eq!(frame.len(), DISPLAY_FRAME_LEN);
        assert_eq!(&frame[2..4], b"01");
        assert!(frame[4..82].iter().all(|&b| b == b' '));
        assert!(frame[82..162].iter().all(|&b| b == b' '));
    }

    #[test]
    fn test_display_truncates_long_lines() {
        let long = vec![b'A'; 120];
        let frame = display(&long, &long);
        assert_eq!(frame.len(), DISPLAY_FRAME_LEN);
        assert!(frame[2..162].iter().all(|&b| b == b'A'));
    }

    #[test]
    fn test_verify_rejects_corruption() {
        let mut frame = display(b"HELLO", b"WORLD");
        assert!(verify(&frame));
        frame[5] ^= 0x01;
        assert!(!verify(&frame));
        assert!(!verify(&[]));
    }

    proptest! {
        #[test]
        fn prop_checksum_closes_sum(body in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut frame = body.clone();
            frame.push(checksum(&body));
            prop_assert!(verify(&frame));
        }

        #[test]
        fn prop_display_frame_is_fixed_length(
            line1 in proptest::collection::vec(any::<u8>(), 0..200),
            line2 in proptest::collection::vec(any::<u8>(), 0..200),
        ) {
            let frame = display(&line1, &line2);
            prop_assert_eq!(frame.len(), DISPLAY_FRAME_LEN);

            let keep1 = line1.len().min(LINE_WIDTH);
            prop_assert_eq!(&frame[2..2 + keep1], &line1[..keep1]);
            let keep2 = line2.len().min(LINE_WIDTH);
            prop_assert_eq!(&frame[82..82 + keep2], &line2[..keep2]);
        }
    }
}
