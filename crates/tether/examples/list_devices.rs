//! Print the serial and MIDI devices tether can see.
//!
//! ```text
//! RUST_LOG=debug cargo run -p tether --example list_devices
//! ```

fn main() {
    env_logger::init();
    print!("{}", tether::describe_all_devices("tether-list"));
}
