//! Stream catalog carried in `INFO STREAMS` responses.
//!
//! ```xml
//! <seedlink>
//!   <station name="STA1" network="AM">
//!     <stream seedname="SHZ" location="" type="D"/>
//!   </station>
//! </seedlink>
//! ```

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ProtocolError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogStream {
    pub seedname: String,
    pub location: String,
    pub type_code: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogStation {
    pub network: String,
    pub name: String,
    pub streams: Vec<CatalogStream>,
}

/// Parse an `INFO STREAMS` document.
///
/// Unknown elements and attributes are ignored; a `<stream>` outside a
/// `<station>` is an error.
pub fn parse_streams_xml(xml: &str) -> Result<Vec<CatalogStation>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stations = Vec::new();
    let mut open: Option<CatalogStation> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ProtocolError::InvalidCatalog(format!(
                "at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"station" => {
                if let Some(done) = open.replace(station_from(&e)?) {
                    stations.push(done);
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"station" => {
                if let Some(done) = open.take() {
                    stations.push(done);
                }
                stations.push(station_from(&e)?);
            }
            Event::End(e) if e.name().as_ref() == b"station" => {
                if let Some(done) = open.take() {
                    stations.push(done);
                }
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"stream" => {
                let station = open.as_mut().ok_or_else(|| {
                    ProtocolError::InvalidCatalog("<stream> outside <station>".into())
                })?;
                station.streams.push(CatalogStream {
                    seedname: attribute(&e, b"seedname")?,
                    location: attribute(&e, b"location")?,
                    type_code: attribute(&e, b"type")?,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(done) = open {
        stations.push(done);
    }
    Ok(stations)
}

/// Render stations as an `INFO STREAMS` document.
pub fn to_streams_xml(stations: &[CatalogStation]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<seedlink>\n");
    for s in stations {
        xml.push_str(&format!(
            "  <station name=\"{}\" network=\"{}\">\n",
            xml_escape(&s.name),
            xml_escape(&s.network),
        ));
        for c in &s.streams {
            xml.push_str(&format!(
                "    <stream seedname=\"{}\" location=\"{}\" type=\"{}\"/>\n",
                xml_escape(&c.seedname),
                xml_escape(&c.location),
                xml_escape(&c.type_code),
            ));
        }
        xml.push_str("  </station>\n");
    }
    xml.push_str("</seedlink>\n");
    xml
}

fn station_from(e: &BytesStart<'_>) -> Result<CatalogStation> {
    Ok(CatalogStation {
        network: attribute(e, b"network")?,
        name: attribute(e, b"name")?,
        streams: Vec::new(),
    })
}

/// Attribute value, or empty when absent.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ProtocolError::InvalidCatalog(err.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| ProtocolError::InvalidCatalog(err.to_string()))?;
            return Ok(value.into_owned());
        }
    }
    Ok(String::new())
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<seedlink software="SeedLink v3.3" organization="Raspberry Shake">
  <station name="R0A1B" network="AM" description="" begin_seq="000000" end_seq="00A3F1">
    <stream seedname="EHZ" location="00" type="D" begin_time="2024/03/01 00:00:00.0000"/>
    <stream seedname="SHZ" location="" type="D"/>
  </station>
  <station name="EMPTY" network="XX"/>
  <station name="WLF" network="GE">
    <stream seedname="BHZ" location="" type="D"/>
  </station>
</seedlink>"#;

    #[test]
    fn parses_stations_and_streams() {
        let stations = parse_streams_xml(SAMPLE).unwrap();
        assert_eq!(stations.len(), 3);

        assert_eq!(stations[0].network, "AM");
        assert_eq!(stations[0].name, "R0A1B");
        assert_eq!(
            stations[0].streams,
            vec![
                CatalogStream {
                    seedname: "EHZ".into(),
                    location: "00".into(),
                    type_code: "D".into(),
                },
                CatalogStream {
                    seedname: "SHZ".into(),
                    location: String::new(),
                    type_code: "D".into(),
                },
            ]
        );
        assert!(stations[1].streams.is_empty());
        assert_eq!(stations[2].name, "WLF");
    }

    #[test]
    fn stream_outside_station_is_rejected() {
        let xml = r#"<seedlink><stream seedname="SHZ"/></seedlink>"#;
        assert!(parse_streams_xml(xml).is_err());
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(parse_streams_xml("<seedlink><station name=\"A></seedlink>").is_err());
    }

    #[test]
    fn empty_document() {
        assert!(parse_streams_xml("<seedlink/>").unwrap().is_empty());
    }

    #[test]
    fn rendered_catalog_parses_back() {
        let stations = vec![CatalogStation {
            network: "AM".into(),
            name: "S&1".into(),
            streams: vec![CatalogStream {
                seedname: "SHZ".into(),
                location: String::new(),
                type_code: "D".into(),
            }],
        }];
        let xml = to_streams_xml(&stations);
        assert!(xml.contains("name=\"S&amp;1\""));
        assert_eq!(parse_streams_xml(&xml).unwrap(), stations);
    }
}
