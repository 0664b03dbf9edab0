//! Test utilities for integration tests.
//!
//! Builders for uncompressed single-strip TIFF files, ScanR experiment
//! descriptors and complete plate directories.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use hcs_reader::format::detect::{DESCRIPTOR_FILE, SCANR_SOFTWARE};
use hcs_reader::scanr::{axis_token, DATA_DIR};

// =============================================================================
// TIFF Builder
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// An uncompressed grayscale TIFF, one strip per page.
#[derive(Debug, Clone)]
pub struct TiffBuilder {
    pub width: u32,
    pub height: u32,
    pub bits: u16,
    /// 1 = unsigned, 2 = signed, 3 = float
    pub sample_format: u16,
    pub endian: Endian,
    pub software: Option<String>,
    /// Raw pixel bytes of every page, already in file byte order
    pub pages: Vec<Vec<u8>>,
}

impl TiffBuilder {
    /// 8-bit unsigned planes filled with `fills`, one page per value.
    pub fn gray8(width: u32, height: u32, fills: &[u8]) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            bits: 8,
            sample_format: 1,
            endian: Endian::Little,
            software: Some(SCANR_SOFTWARE.to_string()),
            pages: fills.iter().map(|&v| vec![v; len]).collect(),
        }
    }

    /// 16-bit planes where pixel `i` holds `base + i`.
    pub fn gray16(width: u32, height: u32, base: u16, endian: Endian) -> Self {
        let page: Vec<u8> = (0..(width * height) as u16)
            .flat_map(|i| {
                let v = base.wrapping_add(i);
                match endian {
                    Endian::Little => v.to_le_bytes(),
                    Endian::Big => v.to_be_bytes(),
                }
            })
            .collect();
        Self {
            width,
            height,
            bits: 16,
            sample_format: 2,
            endian,
            software: Some(SCANR_SOFTWARE.to_string()),
            pages: vec![page],
        }
    }

    pub fn without_software(mut self) -> Self {
        self.software = None;
        self
    }

    fn u16_bytes(&self, v: u16) -> [u8; 2] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    fn entry(&self, out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
        out.extend_from_slice(&self.u16_bytes(tag));
        out.extend_from_slice(&self.u16_bytes(field_type));
        out.extend_from_slice(&self.u32_bytes(count));
        if field_type == 3 && count == 1 {
            out.extend_from_slice(&self.u16_bytes(value as u16));
            out.extend_from_slice(&[0, 0]);
        } else {
            out.extend_from_slice(&self.u32_bytes(value));
        }
    }

    /// Serialize the file.
    pub fn build(&self) -> Vec<u8> {
        let mut out = match self.endian {
            Endian::Little => vec![0x49, 0x49],
            Endian::Big => vec![0x4D, 0x4D],
        };
        out.extend_from_slice(&self.u16_bytes(42));
        out.extend_from_slice(&self.u32_bytes(8));

        let software: Vec<u8> = self
            .software
            .as_ref()
            .map(|s| {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                // Keep the pixel data word-aligned
                if bytes.len() % 2 == 1 {
                    bytes.push(0);
                }
                bytes
            })
            .unwrap_or_default();
        let entry_count: u32 = if self.software.is_some() { 11 } else { 10 };
        let ifd_size = 2 + entry_count * 12 + 4;

        for (index, pixels) in self.pages.iter().enumerate() {
            let ifd_pos = out.len() as u32;
            let software_pos = ifd_pos + ifd_size;
            let pixels_pos = software_pos + software.len() as u32;
            let next = if index + 1 < self.pages.len() {
                pixels_pos + pixels.len() as u32
            } else {
                0
            };

            out.extend_from_slice(&self.u16_bytes(entry_count as u16));
            self.entry(&mut out, 256, 4, 1, self.width);
            self.entry(&mut out, 257, 4, 1, self.height);
            self.entry(&mut out, 258, 3, 1, u32::from(self.bits));
            self.entry(&mut out, 259, 3, 1, 1);
            self.entry(&mut out, 262, 3, 1, 1);
            self.entry(&mut out, 273, 4, 1, pixels_pos);
            self.entry(&mut out, 277, 3, 1, 1);
            self.entry(&mut out, 278, 4, 1, self.height);
            self.entry(&mut out, 279, 4, 1, pixels.len() as u32);
            if let Some(s) = &self.software {
                self.entry(&mut out, 305, 2, s.len() as u32 + 1, software_pos);
            }
            self.entry(&mut out, 339, 3, 1, u32::from(self.sample_format));
            out.extend_from_slice(&self.u32_bytes(next));

            out.extend_from_slice(&software);
            out.extend_from_slice(pixels);
        }
        out
    }

    pub fn write(&self, path: &Path) {
        fs::write(path, self.build()).unwrap();
    }
}

// =============================================================================
// Descriptor Builder
// =============================================================================

/// A ScanR experiment descriptor.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    pub field_rows: u32,
    pub field_columns: u32,
    pub slices: u32,
    pub timepoints: u32,
    /// (channel name, idle flag)
    pub channels: Vec<(String, u8)>,
    /// (well index, label)
    pub wells: Vec<(u32, String)>,
    pub plate_name: Option<String>,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self {
            field_rows: 1,
            field_columns: 1,
            slices: 1,
            timepoints: 1,
            ..Self::default()
        }
    }

    pub fn channel(mut self, name: &str) -> Self {
        self.channels.push((name.to_string(), 0));
        self
    }

    pub fn idle_channel(mut self, name: &str) -> Self {
        self.channels.push((name.to_string(), 1));
        self
    }

    pub fn well(mut self, index: u32, label: &str) -> Self {
        self.wells.push((index, label.to_string()));
        self
    }

    pub fn fields(mut self, rows: u32, columns: u32) -> Self {
        self.field_rows = rows;
        self.field_columns = columns;
        self
    }

    pub fn plate_name(mut self, name: &str) -> Self {
        self.plate_name = Some(name.to_string());
        self
    }

    fn pair(xml: &mut String, key: &str, value: impl std::fmt::Display) {
        xml.push_str(&format!(
            "<Cluster><Name>{}</Name><Val>{}</Val></Cluster>\n",
            key, value
        ));
    }

    pub fn build(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Cluster>\n");
        Self::pair(&mut xml, "rows/well", self.field_rows);
        Self::pair(&mut xml, "columns/well", self.field_columns);
        Self::pair(&mut xml, "# slices", self.slices);
        Self::pair(&mut xml, "timeloop real", self.timepoints);
        if let Some(name) = &self.plate_name {
            Self::pair(&mut xml, "plate name", name);
        }
        for (name, idle) in &self.channels {
            Self::pair(&mut xml, "name", name);
            Self::pair(&mut xml, "idle", idle);
        }
        xml.push_str("<Array><Name>well selection table + cDNA</Name>\n");
        for (index, label) in &self.wells {
            xml.push_str(&format!("<Val>{}</Val><Val>{}</Val>\n", index, label));
        }
        xml.push_str("</Array>\n</Cluster>\n");
        xml
    }
}

// =============================================================================
// Plate Directory
// =============================================================================

/// File name ScanR gives a plane.
pub fn plane_file_name(well: u32, position: u32, z: u32, t: u32, channel: &str) -> String {
    format!(
        "--{}--{}--{}--{}--{}.tif",
        axis_token('W', well),
        axis_token('P', position),
        axis_token('Z', z),
        axis_token('T', t),
        channel
    )
}

/// A plate laid out in a temporary directory.
pub struct PlateDir {
    pub dir: TempDir,
}

impl PlateDir {
    pub fn new(descriptor: &DescriptorBuilder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DESCRIPTOR_FILE), descriptor.build()).unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn descriptor(&self) -> PathBuf {
        self.root().join(DESCRIPTOR_FILE)
    }

    pub fn data(&self) -> PathBuf {
        self.root().join(DATA_DIR)
    }

    /// Write a plane file into `data/` and return its path.
    pub fn add_plane(&self, name: &str, tiff: &TiffBuilder) -> PathBuf {
        let path = self.data().join(name);
        tiff.write(&path);
        path
    }

    /// Write a non-plane file next to the descriptor.
    pub fn add_companion(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.root().join(name);
        fs::write(&path, contents).unwrap();
        path
    }
}
