//! Typed command wrappers.
//!
//! Thin convenience methods over [`Link::call`] for the common commands:
//! each builds the field list for its dictionary entry and unpacks the
//! response into Rust types. Anything not covered here is reachable through
//! [`Link::call`] or [`Link::call_named`] with explicit fields.

use crate::codec::{BdAddr, FieldValue, Message, ResultCode};
use crate::error::{BgError, Result};
use crate::link::Link;
use crate::registry::classes;

impl Link {
    /// Verify the device is alive and responsive.
    pub async fn system_hello(&self) -> Result<ResultCode> {
        let rsp = self.call_named("system_hello", vec![]).await?;
        rsp.result_code()
    }

    /// Reset the device, optionally into the firmware-update boot mode.
    /// Fire-and-forget: the device answers with a boot event once it is
    /// back up, not with a response.
    pub async fn system_reset(&self, dfu: bool) -> Result<()> {
        let msg = Message::command(classes::SYSTEM, 0x01, vec![FieldValue::U8(dfu as u8)]);
        self.send_no_response(msg).await
    }

    /// Read the device's Bluetooth address.
    pub async fn system_get_bt_address(&self) -> Result<BdAddr> {
        let rsp = self.call_named("system_get_bt_address", vec![]).await?;
        let bytes = rsp.bytes_at(0)?;
        BdAddr::from_slice(bytes).ok_or_else(|| {
            BgError::Protocol(format!("address field has {} bytes", bytes.len()))
        })
    }

    /// Set the global maximum TX power in 0.1 dBm steps; returns the power
    /// the radio actually selected.
    pub async fn system_set_tx_power(&self, power: i16) -> Result<i16> {
        let rsp = self
            .call_named("system_set_tx_power", vec![FieldValue::I16(power)])
            .await?;
        rsp.i16_at(0)
    }

    /// Fetch up to `length` random bytes from the device.
    pub async fn system_get_random_data(&self, length: u8) -> Result<(ResultCode, Vec<u8>)> {
        let rsp = self
            .call_named("system_get_random_data", vec![FieldValue::U8(length)])
            .await?;
        Ok((rsp.result_code()?, rsp.u8array_at(1)?.to_vec()))
    }

    /// Start scanning for advertising devices. Scan results arrive as
    /// `le_gap_scan_response` events.
    pub async fn le_gap_start_discovery(&self, scanning_phy: u8, mode: u8) -> Result<ResultCode> {
        let rsp = self
            .call_named(
                "le_gap_start_discovery",
                vec![FieldValue::U8(scanning_phy), FieldValue::U8(mode)],
            )
            .await?;
        rsp.result_code()
    }

    /// End the ongoing GAP procedure (discovery, connection attempt).
    pub async fn le_gap_end_procedure(&self) -> Result<ResultCode> {
        let rsp = self.call_named("le_gap_end_procedure", vec![]).await?;
        rsp.result_code()
    }

    /// Open a connection to a device. On success the returned connection
    /// handle identifies the pending connection; `le_connection_opened`
    /// follows once the link is up.
    pub async fn le_gap_connect(
        &self,
        address: BdAddr,
        address_type: u8,
        initiating_phy: u8,
    ) -> Result<(ResultCode, u8)> {
        let rsp = self
            .call_named(
                "le_gap_connect",
                vec![
                    FieldValue::ByteArray(address.as_bytes().to_vec()),
                    FieldValue::U8(address_type),
                    FieldValue::U8(initiating_phy),
                ],
            )
            .await?;
        Ok((rsp.result_code()?, rsp.u8_at(1)?))
    }

    /// Close a connection; `le_connection_closed` follows.
    pub async fn le_connection_close(&self, connection: u8) -> Result<ResultCode> {
        let rsp = self
            .call_named("le_connection_close", vec![FieldValue::U8(connection)])
            .await?;
        rsp.result_code()
    }

    /// Request the RSSI of a connection; the value arrives in a
    /// `le_connection_rssi` event.
    pub async fn le_connection_get_rssi(&self, connection: u8) -> Result<ResultCode> {
        let rsp = self
            .call_named("le_connection_get_rssi", vec![FieldValue::U8(connection)])
            .await?;
        rsp.result_code()
    }

    /// Start reading a characteristic; the data arrives in
    /// `gatt_characteristic_value` events followed by
    /// `gatt_procedure_completed`.
    pub async fn gatt_read_characteristic_value(
        &self,
        connection: u8,
        characteristic: u16,
    ) -> Result<ResultCode> {
        let rsp = self
            .call_named(
                "gatt_read_characteristic_value",
                vec![FieldValue::U8(connection), FieldValue::U16(characteristic)],
            )
            .await?;
        rsp.result_code()
    }

    /// Write a characteristic value with acknowledgement;
    /// `gatt_procedure_completed` reports the outcome.
    pub async fn gatt_write_characteristic_value(
        &self,
        connection: u8,
        characteristic: u16,
        value: &[u8],
    ) -> Result<ResultCode> {
        let rsp = self
            .call_named(
                "gatt_write_characteristic_value",
                vec![
                    FieldValue::U8(connection),
                    FieldValue::U16(characteristic),
                    FieldValue::U8Array(value.to_vec()),
                ],
            )
            .await?;
        rsp.result_code()
    }

    /// Allow or forbid new bondings.
    pub async fn sm_set_bondable_mode(&self, bondable: bool) -> Result<ResultCode> {
        let rsp = self
            .call_named(
                "sm_set_bondable_mode",
                vec![FieldValue::U8(bondable as u8)],
            )
            .await?;
        rsp.result_code()
    }
}
