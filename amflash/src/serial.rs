use anyhow::{Context, Result, anyhow, bail};
use serialport::{SerialPortInfo, SerialPortType};
use std::io::{self, BufRead, Write};

/// Convert macOS /dev/tty.* ports to /dev/cu.* ports
///
/// On macOS, /dev/tty.* ports block on open until carrier detect is raised,
/// so the /dev/cu.* equivalent is used instead.
fn normalize_mac_port_name(port_name: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        if port_name.starts_with("/dev/tty.") {
            return port_name.replace("/dev/tty.", "/dev/cu.");
        }
    }
    port_name.to_string()
}

pub fn normalize_port_name(port_name: &str) -> String {
    normalize_mac_port_name(port_name)
}

fn available_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| anyhow!("Failed to get available ports list: {}", e))?;

    // On macOS, only use /dev/cu.* ports, not /dev/tty.* ports
    #[cfg(target_os = "macos")]
    let ports: Vec<_> = ports
        .into_iter()
        .filter(|port| !port.port_name.starts_with("/dev/tty."))
        .collect();

    Ok(ports)
}

/// Check if the specified serial port is available
pub fn check_port_available(port_name: &str) -> Result<()> {
    let ports = available_ports()?;
    if ports.iter().any(|p| p.port_name == port_name) {
        return Ok(());
    }

    let available_ports: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();
    bail!(
        "The specified port '{}' does not exist. Available ports: {}",
        port_name,
        if available_ports.is_empty() {
            "No available ports".to_string()
        } else {
            available_ports.join(", ")
        }
    )
}

/// One line per port for the selection prompt.
fn describe(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB serial device");
            format!(
                "{} ({}, {:04x}:{:04x})",
                port.port_name, product, usb.vid, usb.pid
            )
        }
        SerialPortType::BluetoothPort => format!("{} (Bluetooth)", port.port_name),
        SerialPortType::PciPort => format!("{} (PCI)", port.port_name),
        SerialPortType::Unknown => port.port_name.clone(),
    }
}

/// Parse the answer to the port prompt.
fn parse_selection(answer: &str, count: usize) -> Result<usize> {
    let index: usize = answer
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid serial port selection '{}'", answer.trim()))?;
    if index >= count {
        bail!("Invalid serial port selection {}, expected 0 to {}", index, count - 1);
    }
    Ok(index)
}

fn prompt_port<R: BufRead, W: Write>(
    ports: &[SerialPortInfo],
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    if ports.is_empty() {
        bail!("No serial ports available");
    }

    writeln!(output, "Available serial ports:")?;
    for (index, port) in ports.iter().enumerate() {
        writeln!(output, "{}: {}", index, describe(port))?;
    }
    write!(output, "\nSelect serial port: ")?;
    output.flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read serial port selection")?;
    let index = parse_selection(&answer, ports.len())?;
    Ok(ports[index].port_name.clone())
}

/// List the available ports and ask the user to pick one.
pub fn select_port() -> Result<String> {
    let ports = available_ports()?;
    let stdin = io::stdin();
    prompt_port(&ports, &mut stdin.lock(), &mut io::stdout())
}
