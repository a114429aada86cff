//! Integration tests for the SOAP wire codecs.
//!
//! Messages are encoded to bytes and decoded back through the public API,
//! the way a transport would use the codec.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use xopwire_soap::xml::{EndTag, StartTag};
use xopwire_soap::xopwire_mime::Attachment;
use xopwire_soap::{
    BinaryData, CodecConfig, ContentClass, ErrorKind, RootKind, SOAP11_NAMESPACE,
    SOAP12_NAMESPACE, SoapCodec, SoapVersion, StreamMessage, Token, XOP_NAMESPACE, classify,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mtom_codec(threshold: usize) -> SoapCodec {
    SoapCodec::new(
        CodecConfig::builder()
            .mtom(true)
            .threshold(threshold)
            .soap_version(SoapVersion::Soap12)
            .build(),
    )
}

/// A payload of one `m:data` element holding `len` bytes of binary content.
fn binary_message(len: usize) -> StreamMessage {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    StreamMessage::from_tokens(
        SoapVersion::Soap12,
        vec![
            Token::Start(StartTag::new("m:data", Some("urn:m")).with_attribute("xmlns:m", "urn:m")),
            Token::Binary(BinaryData::new(data, Some("application/octet-stream"))),
            Token::End(EndTag::new("m:data", Some("urn:m"))),
        ],
    )
    .unwrap()
}

fn encode(codec: &SoapCodec, message: &mut StreamMessage) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    let content_type = codec.encode(message, &mut body).unwrap();
    (content_type, body)
}

fn codec_decode(content_type: &str, body: Vec<u8>) -> StreamMessage {
    SoapCodec::new(CodecConfig::default()).decode(body, content_type).unwrap()
}

fn count(haystack: &[u8], needle: &str) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle.as_bytes())
        .count()
}

#[test]
fn test_mtom_round_trip() {
    init_tracing();
    let codec = mtom_codec(0);
    let mut message = binary_message(1000);

    let (content_type, body) = encode(&codec, &mut message);
    assert!(content_type.starts_with("multipart/related; type=\"application/xop+xml\""));
    assert_eq!(count(&body, "xop:Include"), 1);

    let mut decoded = codec.decode(body, &content_type).unwrap();
    assert_eq!(decoded.version(), SoapVersion::Soap12);
    assert_eq!(decoded.payload_local_name(), Some("data"));
    assert_eq!(decoded.payload_namespace(), Some("urn:m"));
    assert_eq!(decoded.attachments().len(), 1);
    assert!(decoded.decode_info().unwrap().mtom);

    let tokens = decoded.read_payload_tokens().unwrap();
    assert_eq!(tokens.len(), 3);
    let Token::Binary(binary) = &tokens[1] else {
        panic!("expected binary content, got {:?}", tokens[1]);
    };
    let expected: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
    assert_eq!(binary.data().as_ref(), expected.as_slice());
    assert_eq!(binary.content_type(), Some("application/octet-stream"));
}

#[test]
fn test_threshold_boundary() {
    let codec = mtom_codec(16);

    let (content_type, body) = encode(&codec, &mut binary_message(15));
    assert_eq!(count(&body, "xop:Include"), 0);
    let mut inlined = codec.decode(body, &content_type).unwrap();
    assert!(inlined.attachments().is_empty());
    let tokens = inlined.read_payload_tokens().unwrap();
    assert_eq!(
        tokens[1],
        Token::Text(BinaryData::new((0..15u8).collect::<Vec<_>>(), None).to_base64())
    );

    let (content_type, body) = encode(&codec, &mut binary_message(16));
    assert_eq!(count(&body, "xop:Include"), 1);
    let hoisted = codec.decode(body, &content_type).unwrap();
    assert_eq!(hoisted.attachments().len(), 1);
}

#[test]
fn test_reencode_keeps_attachment_identity() {
    let codec = mtom_codec(0);
    let (content_type, body) = encode(&codec, &mut binary_message(64));
    let mut decoded = codec.decode(body, &content_type).unwrap();
    let content_id = decoded.attachments().iter().next().unwrap().content_id().clone();

    // A plain XML codec still answers an MTOM message with MTOM.
    let reply_codec = SoapCodec::new(CodecConfig::default());
    let (content_type, body) = encode(&reply_codec, &mut decoded);
    assert!(classify(&content_type).is_mtom());
    assert_eq!(count(&body, "Content-Id: <"), 2);
    assert_eq!(count(&body, &content_id.href()), 1);
}

#[test]
fn test_reencode_above_threshold_sends_data_once() {
    let (content_type, body) = encode(&mtom_codec(0), &mut binary_message(64));
    let mut decoded = codec_decode(&content_type, body);
    let content_id = decoded.attachments().iter().next().unwrap().content_id().clone();

    let (content_type, body) = encode(&mtom_codec(1000), &mut decoded);
    assert!(classify(&content_type).is_mtom());
    assert_eq!(count(&body, "xop:Include"), 0);
    assert_eq!(count(&body, "Content-Id: <"), 1);
    assert_eq!(count(&body, content_id.as_str()), 0);

    let mut again = codec_decode(&content_type, body);
    assert!(again.attachments().is_empty());
    let tokens = again.read_payload_tokens().unwrap();
    let expected: Vec<u8> = (0..64).map(|i| (i % 251) as u8).collect();
    assert_eq!(tokens[1], Token::Text(BinaryData::new(expected, None).to_base64()));
}

#[test]
fn test_attachment_added_after_content_type_query() {
    let codec = SoapCodec::new(CodecConfig::builder().write_xml_declaration(false).build());
    let mut message =
        StreamMessage::from_payload_xml(SoapVersion::Soap11, &b"<p/>"[..]).unwrap();

    let single = codec.static_content_type(&mut message).unwrap();
    assert!(single.boundary.is_none());
    message.add_attachment(Attachment::new("att1@x", "text/plain", &b"payload"[..]));

    let (content_type, body) = encode(&codec, &mut message);
    assert!(content_type.starts_with("multipart/related"), "{content_type}");
    assert_eq!(count(&body, "Content-Id: <att1@x>"), 1);
    assert_eq!(count(&body, "payload"), 1);

    let decoded = codec.decode(body, &content_type).unwrap();
    assert_eq!(decoded.attachments().len(), 1);
}

#[test]
fn test_attachments_mut_drops_single_part_type() {
    let codec = SoapCodec::new(CodecConfig::default());
    let mut message =
        StreamMessage::from_payload_xml(SoapVersion::Soap12, &b"<p/>"[..]).unwrap();

    codec.static_content_type(&mut message).unwrap();
    message
        .attachments_mut()
        .add(Attachment::new("late@x", "text/plain", &b"late"[..]));

    let refreshed = codec.static_content_type(&mut message).unwrap();
    assert!(refreshed.boundary.is_some());
    let (content_type, body) = encode(&codec, &mut message);
    assert_eq!(content_type, refreshed.content_type);
    assert_eq!(count(&body, "Content-Id: <late@x>"), 1);
}

#[test]
fn test_multipart_type_survives_added_attachment() {
    let codec = mtom_codec(0);
    let mut message = binary_message(8);

    let announced = codec.static_content_type(&mut message).unwrap();
    message.add_attachment(Attachment::new("extra@x", "text/plain", &b"extra"[..]));

    let (content_type, body) = encode(&codec, &mut message);
    assert_eq!(content_type, announced.content_type);
    assert_eq!(count(&body, announced.boundary.unwrap().as_str()), 4);
    assert_eq!(count(&body, "Content-Id: <extra@x>"), 1);
}

#[test]
fn test_us_ascii_encoding_escapes_payload() {
    let codec = SoapCodec::new(
        CodecConfig::builder()
            .preferred_encoding("us-ascii")
            .write_xml_declaration(false)
            .build(),
    );
    let payload = "<m:a xmlns:m=\"urn:m\">caf\u{e9}</m:a>";
    let mut message =
        StreamMessage::from_payload_xml(SoapVersion::Soap11, payload.as_bytes().to_vec()).unwrap();

    let (content_type, body) = encode(&codec, &mut message);
    assert_eq!(content_type, "text/xml; charset=us-ascii");
    assert!(body.is_ascii());
    assert_eq!(count(&body, "caf&#xE9;"), 1);

    let mut decoded = codec.decode(body, &content_type).unwrap();
    assert_eq!(decoded.decode_info().unwrap().charset, "us-ascii");
    let tokens = decoded.read_payload_tokens().unwrap();
    assert_eq!(tokens[1], Token::Text("caf\u{e9}".to_string()));
}

#[test]
fn test_single_consumption() {
    let codec = mtom_codec(0);
    let (content_type, body) = encode(&codec, &mut binary_message(8));

    let mut message = codec.decode(body.clone(), &content_type).unwrap();
    message.read_payload_tokens().unwrap();
    let err = message.read_payload_tokens().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateViolation);
    assert!(err.is_state_violation());

    let mut message = codec.decode(body, &content_type).unwrap();
    let mut copy = message.copy().unwrap();
    let first = message.read_payload_tokens().unwrap();
    let second = copy.read_payload_tokens().unwrap();
    assert_eq!(first, second);
    assert!(matches!(&first[1], Token::Binary(b) if b.len() == 8));
    assert!(message.read_payload_tokens().is_err());
    assert!(copy.read_payload_tokens().is_err());
}

#[test]
fn test_whitespace_fidelity_plain_xml() {
    let codec = SoapCodec::new(CodecConfig::builder().write_xml_declaration(false).build());
    let xml = format!(
        "<soapenv:Envelope xmlns:soapenv=\"{SOAP11_NAMESPACE}\">\n <soapenv:Body>  <payload/>  </soapenv:Body>\n</soapenv:Envelope>"
    );

    let mut message = codec.decode(xml.clone().into_bytes(), "text/xml; charset=utf-8").unwrap();
    assert_eq!(message.body_prologue(), Some("  "));

    let (content_type, body) = encode(&codec, &mut message);
    assert_eq!(content_type, "text/xml; charset=utf-8");
    assert_eq!(String::from_utf8(body).unwrap(), xml);
    assert_eq!(message.body_epilogue(), Some("  "));
}

#[test]
fn test_whitespace_fidelity_mtom() {
    let codec = mtom_codec(0);
    let mut message =
        StreamMessage::from_payload_xml(SoapVersion::Soap12, &b"  <payload/>  "[..]).unwrap();
    let (content_type, body) = encode(&codec, &mut message);

    let mut decoded = codec.decode(body, &content_type).unwrap();
    let (_, body) = encode(&codec, &mut decoded);
    assert_eq!(count(&body, "<S:Body>  <payload/>  </S:Body>"), 1);
}

#[test]
fn test_boundary_freshness() {
    let codec = mtom_codec(0);
    let payload = &b"<p>same</p>"[..];

    let mut parts = Vec::new();
    for _ in 0..2 {
        let mut message = StreamMessage::from_payload_xml(SoapVersion::Soap12, payload).unwrap();
        let encoded = codec.static_content_type(&mut message).unwrap();
        let (content_type, body) = encode(&codec, &mut message);
        assert_eq!(content_type, encoded.content_type);

        let boundary = encoded.boundary.unwrap();
        let root_id = encoded.root_id.unwrap();
        let normalized = String::from_utf8(body)
            .unwrap()
            .replace(boundary.as_str(), "BOUNDARY")
            .replace(root_id.as_str(), "ROOT");
        parts.push((boundary, normalized));
    }

    assert_ne!(parts[0].0, parts[1].0);
    assert_eq!(parts[0].1, parts[1].1);
}

#[test]
fn test_empty_message() {
    let codec = SoapCodec::new(CodecConfig::builder().write_xml_declaration(false).build());
    let xml = format!(
        "<S:Envelope xmlns:S=\"{SOAP11_NAMESPACE}\"><S:Header/><S:Body></S:Body></S:Envelope>"
    );
    let mut message = codec.decode(xml.clone().into_bytes(), "text/xml").unwrap();
    assert!(!message.has_payload());
    assert!(message.attachments().is_empty());
    assert!(message.read_payload_tokens().unwrap().is_empty());

    let (_, first) = encode(&codec, &mut message);
    let (_, second) = encode(&codec, &mut message);
    assert_eq!(String::from_utf8(first).unwrap(), xml);
    assert_eq!(String::from_utf8(second).unwrap(), xml);
}

#[test]
fn test_multi_attachment_decode_out_of_order() {
    let root = format!(
        "<S:Envelope xmlns:S=\"{SOAP11_NAMESPACE}\"><S:Body><m:Doc xmlns:m=\"urn:m\">\
         <m:A><xop:Include xmlns:xop=\"{XOP_NAMESPACE}\" href=\"cid:one@example\"/></m:A>\
         <m:B><xop:Include xmlns:xop=\"{XOP_NAMESPACE}\" href=\"cid:two%40example\"/></m:B>\
         </m:Doc></S:Body></S:Envelope>"
    );
    let body = format!(
        "--MIMEBoundary\r\n\
         Content-Id: <two@example>\r\n\
         Content-Type: text/plain\r\n\
         Content-Transfer-Encoding: binary\r\n\
         \r\n\
         second\r\n\
         --MIMEBoundary\r\n\
         Content-Id: <root.message@example>\r\n\
         Content-Type: application/xop+xml; charset=UTF-8; type=\"text/xml\"\r\n\
         Content-Transfer-Encoding: 8bit\r\n\
         \r\n\
         {root}\r\n\
         --MIMEBoundary\r\n\
         Content-Id: <one@example>\r\n\
         Content-Type: image/png\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         Zmlyc3Q=\r\n\
         --MIMEBoundary--\r\n"
    );
    let content_type = "Multipart/Related; boundary=MIMEBoundary; type=\"application/xop+xml\"; \
                        start=\"<root.message@example>\"; start-info=\"text/xml\"";

    let codec = SoapCodec::new(CodecConfig::default());
    let mut message = codec.decode(body.into_bytes(), content_type).unwrap();
    assert_eq!(message.version(), SoapVersion::Soap11);
    assert_eq!(message.attachments().len(), 2);

    let binaries: Vec<BinaryData> = message
        .read_payload_tokens()
        .unwrap()
        .into_iter()
        .filter_map(|token| match token {
            Token::Binary(binary) => Some(binary),
            _ => None,
        })
        .collect();
    assert_eq!(binaries.len(), 2);
    assert_eq!(binaries[0].data().as_ref(), b"first");
    assert_eq!(binaries[0].content_type(), Some("image/png"));
    assert_eq!(binaries[1].data().as_ref(), b"second");
    assert_eq!(binaries[1].content_id().unwrap().as_str(), "two@example");
}

#[test]
fn test_unresolved_reference() {
    let root = format!(
        "<S:Envelope xmlns:S=\"{SOAP12_NAMESPACE}\"><S:Body><d><xop:Include xmlns:xop=\"{XOP_NAMESPACE}\" href=\"cid:missing\"/></d></S:Body></S:Envelope>"
    );
    let body = format!(
        "--b\r\nContent-Type: application/xop+xml; type=\"application/soap+xml\"\r\n\r\n{root}\r\n--b--"
    );
    let content_type = "multipart/related; type=\"application/xop+xml\"; boundary=b; start-info=\"application/soap+xml\"";

    let lenient = SoapCodec::new(CodecConfig::default());
    let mut message = lenient.decode(body.clone().into_bytes(), content_type).unwrap();
    let tokens = message.read_payload_tokens().unwrap();
    assert!(matches!(&tokens[1], Token::Binary(b) if b.is_empty()));

    let strict = SoapCodec::new(CodecConfig::builder().strict_xop_references(true).build());
    let mut message = strict.decode(body.into_bytes(), content_type).unwrap();
    let err = message.read_payload_tokens().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[test]
fn test_soap12_action_survives() {
    let codec = mtom_codec(0);
    let mut message = binary_message(4);
    message.set_soap_action(Some("urn:example:Upload".to_string()));
    let (content_type, body) = encode(&codec, &mut message);
    assert!(content_type.contains("action=\\\"urn:example:Upload\\\""));

    let decoded = codec.decode(body, &content_type).unwrap();
    assert_eq!(decoded.soap_action(), Some("urn:example:Upload"));

    let xml = SoapCodec::new(CodecConfig::default());
    let envelope = format!("<e:Envelope xmlns:e=\"{SOAP12_NAMESPACE}\"><e:Body/></e:Envelope>");
    let decoded = xml
        .decode(
            envelope.into_bytes(),
            "application/soap+xml; charset=utf-8; action=\"urn:example:Ping\"",
        )
        .unwrap();
    assert_eq!(decoded.version(), SoapVersion::Soap12);
    assert_eq!(decoded.soap_action(), Some("urn:example:Ping"));
}

#[test]
fn test_unsupported_content_types() {
    let codec = SoapCodec::new(CodecConfig::default());
    for content_type in ["image/png", "application/fastinfoset", "not a type"] {
        let err = codec.decode(&b"<x/>"[..], content_type).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMedia, "{content_type}");
    }
}

#[test]
fn test_sniffing() {
    assert_eq!(
        classify("multipart/related; type=\"application/xop+xml\"; boundary=x"),
        ContentClass::Multipart(RootKind::Xop)
    );
    assert_eq!(classify("text/xml; charset=utf-8"), ContentClass::Xml);
    assert_eq!(classify("image/png"), ContentClass::Unknown);
}

proptest! {
    #[test]
    fn test_threshold_decides_hoisting(len in 0usize..48, threshold in 0usize..48) {
        let codec = mtom_codec(threshold);
        let (_, body) = encode(&codec, &mut binary_message(len));
        let hoisted = count(&body, "xop:Include") == 1;
        prop_assert_eq!(hoisted, len >= threshold);
    }
}
