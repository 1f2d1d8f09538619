/*!
Cross-module tests: whole documents through the public API, checked
either byte-exactly or by resolving the emitted output back to
`(uri, local_name)` pairs with a small test-local declaration scanner.
*/
use std::collections::HashMap;
use std::convert::TryInto;

use crate::strings::NCNameStr;
use crate::writer::{BufSink, IoSink, Writer, WriterOptions};

fn name<'x>(s: &'x str) -> &'x NCNameStr {
	s.try_into().unwrap()
}

fn repairing() -> Writer<BufSink> {
	Writer::with_options(BufSink::new(), WriterOptions::default().repairing(true))
}

/// Minimal, test-only namespace resolver for the documents emitted here.
/// Assumes well-formed output without self-closing tags and without
/// whitespace inside attribute values.
fn resolve_names(doc: &str) -> Vec<(String, String)> {
	fn parse_attrs(s: &str) -> Vec<(String, String)> {
		let mut out = Vec::new();
		for part in s.split_whitespace() {
			if let Some(eq) = part.find('=') {
				let value = part[eq + 1..].trim_matches('"');
				out.push((part[..eq].to_string(), value.to_string()));
			}
		}
		out
	}

	let mut scopes: Vec<HashMap<String, String>> = Vec::new();
	let mut root = HashMap::new();
	root.insert(String::new(), String::new());
	scopes.push(root);
	let mut out = Vec::new();
	let mut rest = doc;
	while let Some(start) = rest.find('<') {
		let end = start + rest[start..].find('>').unwrap();
		let tag = &rest[start + 1..end];
		rest = &rest[end + 1..];
		if tag.starts_with('/') {
			scopes.pop();
			continue;
		}
		if tag.starts_with('?') || tag.starts_with('!') {
			continue;
		}
		let (tag_name, attr_text) = match tag.find(char::is_whitespace) {
			Some(i) => (&tag[..i], &tag[i..]),
			None => (tag, ""),
		};
		let mut scope = scopes.last().unwrap().clone();
		let attrs = parse_attrs(attr_text);
		for (attr_name, value) in &attrs {
			if attr_name == "xmlns" {
				scope.insert(String::new(), value.clone());
			} else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
				scope.insert(prefix.to_string(), value.clone());
			}
		}
		let (prefix, local) = match tag_name.find(':') {
			Some(i) => (&tag_name[..i], &tag_name[i + 1..]),
			None => ("", tag_name),
		};
		out.push((scope.get(prefix).cloned().unwrap_or_default(), local.to_string()));
		for (attr_name, _) in &attrs {
			if attr_name == "xmlns" || attr_name.starts_with("xmlns:") {
				continue;
			}
			if let Some(i) = attr_name.find(':') {
				out.push((
					scope.get(&attr_name[..i]).cloned().unwrap_or_default(),
					attr_name[i + 1..].to_string(),
				));
			}
		}
		scopes.push(scope);
	}
	out
}

#[test]
fn repaired_output_resolves_to_the_written_names() {
	let mut w = repairing();
	w.set_prefix(name("p"), "urn:one").unwrap();
	w.write_start_element("urn:one", name("root")).unwrap();
	w.write_start_element("urn:two", name("child")).unwrap();
	// urn:one is still live-bound to p here
	w.write_attribute("urn:one", name("k"), "v").unwrap();
	w.write_end_element().unwrap();
	w.write_start_element("urn:two", name("other")).unwrap();
	w.write_end_element().unwrap();
	w.write_end_element().unwrap();
	let buf = w.finish().unwrap().into_inner();
	let doc = std::str::from_utf8(&buf).unwrap();
	assert_eq!(
		resolve_names(doc),
		vec![
			("urn:one".to_string(), "root".to_string()),
			("urn:two".to_string(), "child".to_string()),
			("urn:one".to_string(), "k".to_string()),
			("urn:two".to_string(), "other".to_string()),
		]
	);
}

#[test]
fn repaired_defaults_and_masking_resolve_correctly() {
	let mut w = repairing();
	w.set_default_namespace("urn:outer").unwrap();
	w.write_start_element("urn:outer", name("a")).unwrap();
	// the empty namespace forces an xmlns="" redeclaration here
	w.write_start_element("", name("plain")).unwrap();
	w.write_start_element("urn:outer", name("b")).unwrap();
	w.write_end_element().unwrap();
	w.write_end_element().unwrap();
	w.write_end_element().unwrap();
	let buf = w.finish().unwrap().into_inner();
	let doc = std::str::from_utf8(&buf).unwrap();
	assert_eq!(
		resolve_names(doc),
		vec![
			("urn:outer".to_string(), "a".to_string()),
			(String::new(), "plain".to_string()),
			("urn:outer".to_string(), "b".to_string()),
		]
	);
}

#[test]
fn a_thousand_generated_prefixes_are_distinct() {
	use crate::scope::RootContext;

	let mut ctx = RootContext::new();
	ctx.bind("ns500".try_into().unwrap(), "urn:reserved");
	let mut w = repairing();
	w.set_root_context(Box::new(ctx));
	w.write_start_element("", name("root")).unwrap();
	for i in 0..1000 {
		let uri = format!("urn:gen:{}", i);
		w.write_attribute(&uri, name("k"), "v").unwrap();
	}
	w.write_end_element().unwrap();
	let buf = w.finish().unwrap().into_inner();
	let doc = std::str::from_utf8(&buf).unwrap();

	let mut prefixes = Vec::new();
	let mut rest = doc;
	while let Some(at) = rest.find(" xmlns:") {
		let decl = &rest[at + 7..];
		let eq = decl.find('=').unwrap();
		prefixes.push(decl[..eq].to_string());
		rest = &decl[eq..];
	}
	assert_eq!(prefixes.len(), 1000);
	assert!(!prefixes.iter().any(|p| p == "ns500"));
	assert!(prefixes.iter().any(|p| p == "ns1"));
	assert!(prefixes.iter().any(|p| p == "ns1001"));
	let unique: std::collections::HashSet<&str> =
		prefixes.iter().map(|p| p.as_str()).collect();
	assert_eq!(unique.len(), prefixes.len());

	// every attribute still resolves to its own namespace
	let resolved = resolve_names(doc);
	assert_eq!(resolved.len(), 1001);
	for (i, (uri, local)) in resolved[1..].iter().enumerate() {
		assert_eq!(uri, &format!("urn:gen:{}", i));
		assert_eq!(local, "k");
	}
}

#[test]
fn strict_document_through_an_io_sink() {
	let mut w = Writer::new(IoSink::new(Vec::new()));
	w.write_xml_declaration().unwrap();
	w.set_prefix(name("s"), "urn:stream").unwrap();
	w.write_start_element("urn:stream", name("stream")).unwrap();
	w.write_namespace(name("s"), "urn:stream").unwrap();
	w.write_attribute("", name("to"), "host.example").unwrap();
	w.write_start_element("urn:stream", name("item")).unwrap();
	w.write_text("a < b").unwrap();
	w.write_end_element().unwrap();
	w.write_end_element().unwrap();
	let out = w.finish().unwrap().into_inner();
	assert_eq!(
		out,
		&b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
		   <s:stream xmlns:s=\"urn:stream\" to=\"host.example\">\
		   <s:item>a &lt; b</s:item></s:stream>"[..]
	);
}

#[test]
fn sibling_subtrees_reuse_prefixes_without_clashing() {
	let mut w = repairing();
	w.write_start_element("", name("r")).unwrap();
	w.write_start_element("urn:a", name("first")).unwrap();
	w.write_end_element().unwrap();
	w.write_start_element("urn:b", name("second")).unwrap();
	w.write_end_element().unwrap();
	w.write_end_element().unwrap();
	let buf = w.finish().unwrap().into_inner();
	let doc = std::str::from_utf8(&buf).unwrap();
	assert_eq!(
		resolve_names(doc),
		vec![
			(String::new(), "r".to_string()),
			("urn:a".to_string(), "first".to_string()),
			("urn:b".to_string(), "second".to_string()),
		]
	);
}
