/*!
Identity material supplied to a Cryptor.

The certificate and private key are injected as PEM blocks. Key bytes are
wiped from memory when the identity is dropped.
*/

use std::fmt;
use std::path::Path;

use zeroize::Zeroizing;

use crate::core::error::{Error, ProvisioningError, Result};

/// PEM certificate chain and private key used by one endpoint
#[derive(Clone)]
pub struct Identity {
    certificate_pem: Vec<u8>,
    private_key_pem: Zeroizing<Vec<u8>>,
}

impl Identity {
    /// Build an identity from in-memory PEM blocks
    pub fn from_pem(
        certificate_pem: impl Into<Vec<u8>>,
        private_key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            certificate_pem: certificate_pem.into(),
            private_key_pem: Zeroizing::new(private_key_pem.into()),
        }
    }

    /// Read an identity from two PEM files.
    ///
    /// Contents are not validated here; parsing happens in `Cryptor::init`.
    pub fn from_pem_files(
        certificate_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let certificate_pem = read_file(certificate_path.as_ref())?;
        let private_key_pem = Zeroizing::new(read_file(private_key_path.as_ref())?);
        Ok(Self {
            certificate_pem,
            private_key_pem,
        })
    }

    /// Certificate chain PEM
    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate_pem
    }

    /// Private key PEM
    pub fn private_key_pem(&self) -> &[u8] {
        &self.private_key_pem
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        Error::Provisioning(ProvisioningError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("certificate_pem", &format_args!("{} bytes", self.certificate_pem.len()))
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}
