use crate::core::network::NetworkSettings;
use crate::utils::error::Result;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Opens the radio's serial port with 8N1 framing and no flow control.
pub fn open_port(settings: &NetworkSettings) -> Result<SerialStream> {
    tracing::debug!(
        "Opening serial device {} at {} baud",
        settings.device,
        settings.baud
    );
    let port = tokio_serial::new(&settings.device, settings.baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;
    Ok(port)
}
