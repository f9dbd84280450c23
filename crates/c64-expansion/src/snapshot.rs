//! Snapshot modules and the container that holds them.
//!
//! Each attached device writes one named module with a (major, minor)
//! version. Payloads are flat little-endian fields; banked images are
//! always written whole, whatever bank happens to be mapped.
//!
//! Container layout:
//!
//! | Field          | Size |
//! |----------------|------|
//! | `"C64X"`       | 4    |
//! | format version | 1    |
//! | module count   | 2    |
//!
//! then per module: name length (1), name, major (1), minor (1),
//! payload length (4), payload.

use crate::banked::BankedImage;
use crate::error::SnapshotError;

pub const CONTAINER_MAGIC: &[u8; 4] = b"C64X";
pub const CONTAINER_VERSION: u8 = 1;

/// One device's saved state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotModule {
    pub name: String,
    pub major: u8,
    pub minor: u8,
    pub data: Vec<u8>,
}

impl SnapshotModule {
    #[must_use]
    pub fn new(name: &str, major: u8, minor: u8) -> Self {
        Self {
            name: name.to_string(),
            major,
            minor,
            data: Vec::new(),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.data.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Length-prefixed byte block.
    pub fn write_block(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.data.extend_from_slice(bytes);
    }

    /// Whole image: bank size, bank count, contents.
    pub fn write_image(&mut self, image: &BankedImage) {
        self.write_u32(image.bank_size() as u32);
        self.write_u32(image.bank_count() as u32);
        self.data.extend_from_slice(image.as_bytes());
    }

    /// Reject a module saved by a newer driver revision.
    pub fn check_version(&self, major: u8, minor: u8) -> Result<(), SnapshotError> {
        if (self.major, self.minor) > (major, minor) {
            return Err(SnapshotError::VersionMismatch {
                module: self.name.clone(),
                major: self.major,
                minor: self.minor,
                max_major: major,
                max_minor: minor,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn reader(&self) -> ModuleReader<'_> {
        ModuleReader {
            module: self,
            pos: 0,
        }
    }
}

/// Cursor over a module's payload.
pub struct ModuleReader<'a> {
    module: &'a SnapshotModule,
    pos: usize,
}

impl ModuleReader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], SnapshotError> {
        let end = self.pos + len;
        let bytes = self
            .module
            .data
            .get(self.pos..end)
            .ok_or_else(|| SnapshotError::Truncated(self.module.name.clone()))?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, SnapshotError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, SnapshotError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, SnapshotError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, SnapshotError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Fill `out` exactly.
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<(), SnapshotError> {
        let b = self.take(out.len())?;
        out.copy_from_slice(b);
        Ok(())
    }

    pub fn read_block(&mut self) -> Result<Vec<u8>, SnapshotError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_image(&mut self) -> Result<BankedImage, SnapshotError> {
        let bank_size = self.read_u32()? as usize;
        let banks = self.read_u32()? as usize;
        if bank_size == 0 {
            return Err(self.rejected("zero bank size"));
        }
        let len = bank_size
            .checked_mul(banks)
            .ok_or_else(|| self.rejected("image size overflows"))?;
        let bytes = self.take(len)?.to_vec();
        Ok(BankedImage::from_bytes(bank_size, bytes))
    }

    /// Read an image that must match `expected` in geometry.
    pub fn read_image_like(&mut self, expected: &BankedImage) -> Result<BankedImage, SnapshotError> {
        let image = self.read_image()?;
        if image.bank_size() != expected.bank_size() || image.len() != expected.len() {
            return Err(self.rejected("image geometry differs from attached device"));
        }
        Ok(image)
    }

    #[must_use]
    pub fn rejected(&self, reason: &str) -> SnapshotError {
        SnapshotError::Rejected {
            module: self.module.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Ordered collection of modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotContainer {
    modules: Vec<SnapshotModule>,
}

impl SnapshotContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, replacing any with the same name.
    pub fn push(&mut self, module: SnapshotModule) {
        if let Some(existing) = self.modules.iter_mut().find(|m| m.name == module.name) {
            *existing = module;
        } else {
            self.modules.push(module);
        }
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SnapshotModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<SnapshotModule> {
        let index = self.modules.iter().position(|m| m.name == name)?;
        Some(self.modules.remove(index))
    }

    #[must_use]
    pub fn modules(&self) -> &[SnapshotModule] {
        &self.modules
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut out = Vec::new();
        out.extend_from_slice(CONTAINER_MAGIC);
        out.push(CONTAINER_VERSION);
        let count = u16::try_from(self.modules.len())
            .map_err(|_| SnapshotError::BadContainer("too many modules".to_string()))?;
        out.extend_from_slice(&count.to_le_bytes());
        for module in &self.modules {
            let name = module.name.as_bytes();
            let name_len = u8::try_from(name.len()).map_err(|_| {
                SnapshotError::BadContainer(format!("module name {} too long", module.name))
            })?;
            out.push(name_len);
            out.extend_from_slice(name);
            out.push(module.major);
            out.push(module.minor);
            out.extend_from_slice(&(module.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&module.data);
        }
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SnapshotError> {
        let truncated = || SnapshotError::BadContainer("truncated".to_string());
        if data.len() < 7 || &data[..4] != CONTAINER_MAGIC {
            return Err(SnapshotError::BadContainer("missing C64X magic".to_string()));
        }
        if data[4] > CONTAINER_VERSION {
            return Err(SnapshotError::BadContainer(format!(
                "container version {} unsupported",
                data[4]
            )));
        }
        let count = u16::from_le_bytes([data[5], data[6]]) as usize;
        let mut pos = 7;
        let mut modules = Vec::with_capacity(count);
        for _ in 0..count {
            let name_len = *data.get(pos).ok_or_else(truncated)? as usize;
            pos += 1;
            let name = data.get(pos..pos + name_len).ok_or_else(truncated)?;
            let name = String::from_utf8_lossy(name).into_owned();
            pos += name_len;
            let header = data.get(pos..pos + 6).ok_or_else(truncated)?;
            let (major, minor) = (header[0], header[1]);
            let len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
            pos += 6;
            let payload = data.get(pos..pos + len).ok_or_else(truncated)?;
            pos += len;
            modules.push(SnapshotModule {
                name,
                major,
                minor,
                data: payload.to_vec(),
            });
        }
        Ok(Self { modules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banked::BANK_8K;

    #[test]
    fn scalar_fields_read_back_in_order() {
        let mut module = SnapshotModule::new("TEST", 1, 0);
        module.write_u8(0x12);
        module.write_bool(true);
        module.write_u16(0x3456);
        module.write_u32(0x789a_bcde);
        module.write_u64(42);
        let mut r = module.reader();
        assert_eq!(r.read_u8().expect("u8"), 0x12);
        assert!(r.read_bool().expect("bool"));
        assert_eq!(r.read_u16().expect("u16"), 0x3456);
        assert_eq!(r.read_u32().expect("u32"), 0x789a_bcde);
        assert_eq!(r.read_u64().expect("u64"), 42);
        assert!(matches!(r.read_u8(), Err(SnapshotError::Truncated(_))));
    }

    #[test]
    fn image_is_written_whole() {
        let mut image = BankedImage::new(BANK_8K, 3);
        image.write(2, 5, 0x77);
        let mut module = SnapshotModule::new("IMG", 0, 1);
        module.write_image(&image);
        let restored = module.reader().read_image().expect("image");
        assert_eq!(restored, image);
    }

    #[test]
    fn image_geometry_must_match() {
        let mut module = SnapshotModule::new("IMG", 0, 1);
        module.write_image(&BankedImage::new(BANK_8K, 2));
        let target = BankedImage::new(BANK_8K, 4);
        assert!(matches!(
            module.reader().read_image_like(&target),
            Err(SnapshotError::Rejected { .. })
        ));
    }

    #[test]
    fn newer_version_is_rejected() {
        let module = SnapshotModule::new("CARTX", 0, 2);
        assert!(module.check_version(0, 2).is_ok());
        assert!(module.check_version(1, 0).is_ok());
        assert!(matches!(
            module.check_version(0, 1),
            Err(SnapshotError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn container_survives_serialisation() {
        let mut container = SnapshotContainer::new();
        let mut a = SnapshotModule::new("CARTRIDGE", 1, 0);
        a.write_u16(5);
        let mut b = SnapshotModule::new("CARTOCEAN", 0, 0);
        b.write_bytes(&[1, 2, 3]);
        container.push(a);
        container.push(b);
        let bytes = container.to_bytes().expect("serialises");
        let back = SnapshotContainer::from_bytes(&bytes).expect("parses");
        assert_eq!(back, container);
        assert_eq!(back.find("CARTOCEAN").map(|m| m.data.len()), Some(3));
    }

    #[test]
    fn container_rejects_bad_magic_and_truncation() {
        assert!(SnapshotContainer::from_bytes(b"NOPE\x01\x00\x00").is_err());
        let mut container = SnapshotContainer::new();
        container.push(SnapshotModule::new("A", 0, 0));
        let mut bytes = container.to_bytes().expect("serialises");
        bytes.pop();
        assert!(SnapshotContainer::from_bytes(&bytes).is_err());
    }
}
