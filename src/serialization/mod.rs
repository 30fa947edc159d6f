/// XML encoding of notices
pub mod xml;

pub use xml::{clean, from_xml, to_xml, try_to_xml, XML_DECLARATION};
