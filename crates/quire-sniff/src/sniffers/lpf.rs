use quire_common::{Container, Format, FormatHints, ReadResult};

use super::{has_entry, hinted};
use crate::sniffer::Sniffer;

/// W3C Lightweight Packaging Format.
#[derive(Debug, Clone, Copy, Default)]
pub struct LpfSniffer;

impl Sniffer for LpfSniffer {
    fn name(&self) -> &'static str {
        "lpf"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &["application/lpf+zip"], &["lpf"]) {
            return Some(Format::W3C_LPF);
        }
        format
    }

    fn sniff_container(
        &self,
        format: Option<Format>,
        container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        if has_entry(container, "index.html") || has_entry(container, "publication.json") {
            return Ok(Some(Format::W3C_LPF));
        }
        Ok(format)
    }
}
