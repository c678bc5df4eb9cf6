// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The `/dev/sev-guest` report channel.  One `SNP_GET_REPORT` request per
//! call, on a handle that is opened for that call only.

use super::report::{AttestationReport, REPORT_SIZE};
use crate::errors::Error;
use crate::evidence::{pad_binding, BINDING_CAPACITY};
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

pub const DEFAULT_DEVICE: &str = "/dev/sev-guest";

/// VM privilege level requested when none is configured
pub const DEFAULT_VMPL: u32 = 1;

/// Size of `struct snp_report_req`
pub const REQUEST_SIZE: usize = 96;

/// Size of `struct snp_report_resp`
pub const RESPONSE_SIZE: usize = 4000;

const REQUEST_VMPL: usize = 64;

const RESPONSE_STATUS: usize = 0x00;
const RESPONSE_REPORT_SIZE: usize = 0x04;
const RESPONSE_REPORT: usize = 0x20;

const MSG_VERSION: u8 = 1;

/// `struct snp_guest_request_ioctl` from `<linux/sev-guest.h>`
#[repr(C)]
struct GuestRequest {
    msg_version: u8,
    req_data: u64,
    resp_data: u64,
    exitinfo2: u64,
}

nix::ioctl_readwrite!(snp_get_report, b'S', 0x0, GuestRequest);

/// A single blocking request/response exchange with the guest device
pub trait GuestDevice {
    fn get_report(
        &self,
        request: &[u8; REQUEST_SIZE],
        response: &mut [u8; RESPONSE_SIZE],
    ) -> Result<(), Error>;
}

impl<F> GuestDevice for F
where
    F: Fn(&[u8; REQUEST_SIZE], &mut [u8; RESPONSE_SIZE]) -> Result<(), Error>,
{
    fn get_report(
        &self,
        request: &[u8; REQUEST_SIZE],
        response: &mut [u8; RESPONSE_SIZE],
    ) -> Result<(), Error> {
        self(request, response)
    }
}

/// The kernel's SEV guest driver
#[derive(Clone, Debug)]
pub struct SevGuestDevice {
    path: PathBuf,
}

impl Default for SevGuestDevice {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

impl SevGuestDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GuestDevice for SevGuestDevice {
    fn get_report(
        &self,
        request: &[u8; REQUEST_SIZE],
        response: &mut [u8; RESPONSE_SIZE],
    ) -> Result<(), Error> {
        // closed on drop, whichever way we leave
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| Error::Device(format!("failed to open {}: {e}", self.path.display())))?;

        let mut req = GuestRequest {
            msg_version: MSG_VERSION,
            req_data: request.as_ptr() as u64,
            resp_data: response.as_mut_ptr() as u64,
            exitinfo2: 0,
        };

        tracing::debug!("issuing SNP_GET_REPORT on {}", self.path.display());

        // SAFETY: req points at buffers of the sizes the driver expects, both
        // of which outlive the call.
        unsafe { snp_get_report(f.as_raw_fd(), &mut req) }.map_err(|e| {
            let fw_err = req.exitinfo2 as u32;
            let vmm_err = (req.exitinfo2 >> 32) as u32;

            tracing::error!(
                "SNP_GET_REPORT failed: {e}, firmware error {fw_err:#x}, vmm error {vmm_err:#x}"
            );

            Error::Device(format!(
                "SNP_GET_REPORT ioctl failed: {e} (firmware error {fw_err:#x}, vmm error {vmm_err:#x})"
            ))
        })?;

        Ok(())
    }
}

/// `struct snp_report_req`
#[derive(Debug)]
pub struct ReportRequest {
    pub user_data: [u8; BINDING_CAPACITY],
    pub vmpl: u32,
}

impl ReportRequest {
    pub fn to_bytes(&self) -> [u8; REQUEST_SIZE] {
        let mut b = [0u8; REQUEST_SIZE];
        b[..BINDING_CAPACITY].copy_from_slice(&self.user_data);
        b[REQUEST_VMPL..REQUEST_VMPL + 4].copy_from_slice(&self.vmpl.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8; REQUEST_SIZE]) -> Self {
        let mut user_data = [0u8; BINDING_CAPACITY];
        user_data.copy_from_slice(&b[..BINDING_CAPACITY]);

        let mut vmpl = [0u8; 4];
        vmpl.copy_from_slice(&b[REQUEST_VMPL..REQUEST_VMPL + 4]);

        Self {
            user_data,
            vmpl: u32::from_le_bytes(vmpl),
        }
    }
}

/// `struct snp_msg_report_rsp`, the payload of `struct snp_report_resp`
#[derive(Debug)]
pub struct ReportResponse<'a> {
    pub report: &'a [u8],
}

impl<'a> ReportResponse<'a> {
    /// Validate the envelope: the status must be zero and the reported size
    /// must be exactly [`REPORT_SIZE`]
    pub fn decode(b: &'a [u8; RESPONSE_SIZE]) -> Result<Self, Error> {
        let status = u32::from_le_bytes([
            b[RESPONSE_STATUS],
            b[RESPONSE_STATUS + 1],
            b[RESPONSE_STATUS + 2],
            b[RESPONSE_STATUS + 3],
        ]);

        if status != 0 {
            tracing::error!("firmware error {status:#x}");
            return Err(Error::RequestFailed(status));
        }

        let report_size = u32::from_le_bytes([
            b[RESPONSE_REPORT_SIZE],
            b[RESPONSE_REPORT_SIZE + 1],
            b[RESPONSE_REPORT_SIZE + 2],
            b[RESPONSE_REPORT_SIZE + 3],
        ]) as usize;

        if report_size != REPORT_SIZE {
            tracing::error!("report size is {report_size} bytes (expected {REPORT_SIZE})");
            return Err(Error::SizeMismatch {
                expected: REPORT_SIZE,
                got: report_size,
            });
        }

        Ok(Self {
            report: &b[RESPONSE_REPORT..RESPONSE_REPORT + REPORT_SIZE],
        })
    }

    /// Encode a response envelope, as the firmware would
    pub fn encode(status: u32, report: &[u8], out: &mut [u8; RESPONSE_SIZE]) {
        out[RESPONSE_STATUS..RESPONSE_STATUS + 4].copy_from_slice(&status.to_le_bytes());
        out[RESPONSE_REPORT_SIZE..RESPONSE_REPORT_SIZE + 4]
            .copy_from_slice(&(report.len() as u32).to_le_bytes());

        let n = report.len().min(RESPONSE_SIZE - RESPONSE_REPORT);
        out[RESPONSE_REPORT..RESPONSE_REPORT + n].copy_from_slice(&report[..n]);
    }
}

/// Ask the device for a report carrying `binding` (zero padded).  Fails
/// without touching the device if `binding` exceeds the capacity.
pub fn request_report(
    device: &impl GuestDevice,
    binding: &[u8],
    vmpl: u32,
) -> Result<AttestationReport, Error> {
    let user_data = pad_binding(binding)?;

    let req = ReportRequest { user_data, vmpl }.to_bytes();
    let mut resp = Box::new([0u8; RESPONSE_SIZE]);

    device.get_report(&req, &mut resp)?;

    let r = ReportResponse::decode(&resp)?;

    AttestationReport::decode(r.report)
}
