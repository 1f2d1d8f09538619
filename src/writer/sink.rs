/*!
# Low-level escaping output sinks

The writer in the parent module only decides *what* to emit; the actual
bytes are produced by a [`Sink`]. Sinks receive pre-validated names
([`NCNameStr`]) and raw text, and are responsible for entity escaping and
the token-level syntax.

Two implementations are provided: [`BufSink`], which accumulates the
document in a [`BytesMut`], and [`IoSink`], which forwards each token to a
blocking [`io::Write`].
*/
use std::io;

use bytes::{BufMut, BytesMut};

use crate::error::{DocumentError, Error, Result};
use crate::strings::NCNameStr;

static XML_DECLARATION: &'static [u8] = b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

static TEXT_SPECIALS: &'static [u8] = &[b'<', b'>', b'&', b'\r'];
static ATTR_SPECIALS: &'static [u8] = &[b'<', b'>', b'&', b'"', b'\'', b'\r', b'\n', b'\t'];

fn escape<B: BufMut>(out: &mut B, data: &[u8], specials: &'static [u8]) {
	let mut last = 0;
	for (i, b) in data.iter().enumerate() {
		if !specials.contains(b) {
			continue;
		}
		if last < i {
			out.put_slice(&data[last..i]);
		}
		match *b {
			b'<' => out.put_slice(b"&lt;"),
			b'>' => out.put_slice(b"&gt;"),
			b'&' => out.put_slice(b"&amp;"),
			b'"' => out.put_slice(b"&#34;"),
			b'\'' => out.put_slice(b"&#39;"),
			b'\r' => out.put_slice(b"&#xd;"),
			b'\n' => out.put_slice(b"&#xa;"),
			b'\t' => out.put_slice(b"&#x9;"),
			_ => unreachable!(),
		}
		last = i + 1;
	}
	if last < data.len() {
		out.put_slice(&data[last..]);
	}
}

fn put_name<B: BufMut>(out: &mut B, prefix: Option<&NCNameStr>, local_name: &NCNameStr) {
	if let Some(prefix) = prefix {
		out.put_slice(prefix.as_bytes());
		out.put_u8(b':');
	}
	out.put_slice(local_name.as_bytes());
}

fn put_start_tag<B: BufMut>(out: &mut B, prefix: Option<&NCNameStr>, local_name: &NCNameStr) {
	out.put_u8(b'<');
	put_name(out, prefix, local_name);
}

fn put_end_tag<B: BufMut>(out: &mut B, prefix: Option<&NCNameStr>, local_name: &NCNameStr) {
	out.put_slice(b"</");
	put_name(out, prefix, local_name);
	out.put_u8(b'>');
}

fn put_attribute<B: BufMut>(
	out: &mut B,
	prefix: Option<&NCNameStr>,
	local_name: &NCNameStr,
	value: &str,
) {
	out.put_u8(b' ');
	put_name(out, prefix, local_name);
	out.put_slice(b"=\"");
	escape(out, value.as_bytes(), ATTR_SPECIALS);
	out.put_u8(b'"');
}

fn put_namespace_decl<B: BufMut>(out: &mut B, prefix: &NCNameStr, uri: &str) {
	out.put_slice(b" xmlns:");
	out.put_slice(prefix.as_bytes());
	out.put_slice(b"=\"");
	escape(out, uri.as_bytes(), ATTR_SPECIALS);
	out.put_u8(b'"');
}

fn put_default_namespace_decl<B: BufMut>(out: &mut B, uri: &str) {
	out.put_slice(b" xmlns=\"");
	escape(out, uri.as_bytes(), ATTR_SPECIALS);
	out.put_u8(b'"');
}

fn put_cdata<B: BufMut>(out: &mut B, data: &str) {
	// a literal ]]> inside the data splits the section
	out.put_slice(b"<![CDATA[");
	let mut first = true;
	for part in data.split("]]>") {
		if !first {
			out.put_slice(b"]]]]><![CDATA[>");
		}
		first = false;
		out.put_slice(part.as_bytes());
	}
	out.put_slice(b"]]>");
}

fn put_comment<B: BufMut>(out: &mut B, data: &str) -> Result<()> {
	if data.contains("--") || data.ends_with('-') {
		return Err(DocumentError::IllegalComment.into());
	}
	out.put_slice(b"<!--");
	out.put_slice(data.as_bytes());
	out.put_slice(b"-->");
	Ok(())
}

fn put_pi<B: BufMut>(out: &mut B, target: &NCNameStr, data: Option<&str>) -> Result<()> {
	if data.map_or(false, |d| d.contains("?>")) {
		return Err(DocumentError::IllegalProcessingInstruction.into());
	}
	out.put_slice(b"<?");
	out.put_slice(target.as_bytes());
	if let Some(data) = data {
		out.put_u8(b' ');
		out.put_slice(data.as_bytes());
	}
	out.put_slice(b"?>");
	Ok(())
}

/**
# Token-level output of the writer

One call per emitted token. Names arrive pre-validated; attribute values,
namespace URIs and character data arrive raw and must be escaped by the
implementation.

Note that a start tag is emitted in pieces: [`Sink::write_start_tag`],
then any number of declarations and attributes, then
[`Sink::write_head_end`].
*/
pub trait Sink {
	fn write_xml_declaration(&mut self) -> Result<()>;
	fn write_start_tag(&mut self, prefix: Option<&NCNameStr>, local_name: &NCNameStr)
		-> Result<()>;
	fn write_head_end(&mut self) -> Result<()>;
	fn write_end_tag(&mut self, prefix: Option<&NCNameStr>, local_name: &NCNameStr) -> Result<()>;
	fn write_namespace_decl(&mut self, prefix: &NCNameStr, uri: &str) -> Result<()>;
	fn write_default_namespace_decl(&mut self, uri: &str) -> Result<()>;
	fn write_attribute(
		&mut self,
		prefix: Option<&NCNameStr>,
		local_name: &NCNameStr,
		value: &str,
	) -> Result<()>;
	fn write_text(&mut self, data: &str) -> Result<()>;
	fn write_cdata(&mut self, data: &str) -> Result<()>;
	fn write_comment(&mut self, data: &str) -> Result<()>;
	fn write_pi(&mut self, target: &NCNameStr, data: Option<&str>) -> Result<()>;
	/// Emit pre-computed inter-token whitespace verbatim.
	fn write_raw_indentation(&mut self, text: &str) -> Result<()>;
}

/// In-memory sink accumulating the document in a [`BytesMut`].
#[derive(Debug, Default)]
pub struct BufSink {
	buf: BytesMut,
}

impl BufSink {
	pub fn new() -> Self {
		Self::default()
	}

	/// Use an existing buffer, appending to its contents.
	pub fn with_buffer(buf: BytesMut) -> Self {
		Self { buf }
	}

	/// The document emitted so far.
	pub fn buffer(&self) -> &[u8] {
		&self.buf
	}

	pub fn into_inner(self) -> BytesMut {
		self.buf
	}
}

impl Sink for BufSink {
	fn write_xml_declaration(&mut self) -> Result<()> {
		self.buf.put_slice(XML_DECLARATION);
		Ok(())
	}

	fn write_start_tag(
		&mut self,
		prefix: Option<&NCNameStr>,
		local_name: &NCNameStr,
	) -> Result<()> {
		put_start_tag(&mut self.buf, prefix, local_name);
		Ok(())
	}

	fn write_head_end(&mut self) -> Result<()> {
		self.buf.put_u8(b'>');
		Ok(())
	}

	fn write_end_tag(&mut self, prefix: Option<&NCNameStr>, local_name: &NCNameStr) -> Result<()> {
		put_end_tag(&mut self.buf, prefix, local_name);
		Ok(())
	}

	fn write_namespace_decl(&mut self, prefix: &NCNameStr, uri: &str) -> Result<()> {
		put_namespace_decl(&mut self.buf, prefix, uri);
		Ok(())
	}

	fn write_default_namespace_decl(&mut self, uri: &str) -> Result<()> {
		put_default_namespace_decl(&mut self.buf, uri);
		Ok(())
	}

	fn write_attribute(
		&mut self,
		prefix: Option<&NCNameStr>,
		local_name: &NCNameStr,
		value: &str,
	) -> Result<()> {
		put_attribute(&mut self.buf, prefix, local_name, value);
		Ok(())
	}

	fn write_text(&mut self, data: &str) -> Result<()> {
		escape(&mut self.buf, data.as_bytes(), TEXT_SPECIALS);
		Ok(())
	}

	fn write_cdata(&mut self, data: &str) -> Result<()> {
		put_cdata(&mut self.buf, data);
		Ok(())
	}

	fn write_comment(&mut self, data: &str) -> Result<()> {
		put_comment(&mut self.buf, data)
	}

	fn write_pi(&mut self, target: &NCNameStr, data: Option<&str>) -> Result<()> {
		put_pi(&mut self.buf, target, data)
	}

	fn write_raw_indentation(&mut self, text: &str) -> Result<()> {
		self.buf.put_slice(text.as_bytes());
		Ok(())
	}
}

/// Sink forwarding each token to a blocking [`io::Write`].
///
/// Tokens are assembled in a scratch buffer and handed to the inner
/// writer in one `write_all` each; wrap the inner writer in a
/// [`std::io::BufWriter`] if per-token writes are too fine-grained.
pub struct IoSink<W: io::Write> {
	inner: W,
	scratch: BytesMut,
}

impl<W: io::Write> IoSink<W> {
	pub fn new(inner: W) -> Self {
		Self {
			inner,
			scratch: BytesMut::new(),
		}
	}

	pub fn get_ref(&self) -> &W {
		&self.inner
	}

	pub fn get_mut(&mut self) -> &mut W {
		&mut self.inner
	}

	pub fn into_inner(self) -> W {
		self.inner
	}

	fn commit(&mut self) -> Result<()> {
		let result = self.inner.write_all(&self.scratch);
		self.scratch.clear();
		result.map_err(Error::io)
	}
}

impl<W: io::Write> Sink for IoSink<W> {
	fn write_xml_declaration(&mut self) -> Result<()> {
		self.scratch.put_slice(XML_DECLARATION);
		self.commit()
	}

	fn write_start_tag(
		&mut self,
		prefix: Option<&NCNameStr>,
		local_name: &NCNameStr,
	) -> Result<()> {
		put_start_tag(&mut self.scratch, prefix, local_name);
		self.commit()
	}

	fn write_head_end(&mut self) -> Result<()> {
		self.scratch.put_u8(b'>');
		self.commit()
	}

	fn write_end_tag(&mut self, prefix: Option<&NCNameStr>, local_name: &NCNameStr) -> Result<()> {
		put_end_tag(&mut self.scratch, prefix, local_name);
		self.commit()
	}

	fn write_namespace_decl(&mut self, prefix: &NCNameStr, uri: &str) -> Result<()> {
		put_namespace_decl(&mut self.scratch, prefix, uri);
		self.commit()
	}

	fn write_default_namespace_decl(&mut self, uri: &str) -> Result<()> {
		put_default_namespace_decl(&mut self.scratch, uri);
		self.commit()
	}

	fn write_attribute(
		&mut self,
		prefix: Option<&NCNameStr>,
		local_name: &NCNameStr,
		value: &str,
	) -> Result<()> {
		put_attribute(&mut self.scratch, prefix, local_name, value);
		self.commit()
	}

	fn write_text(&mut self, data: &str) -> Result<()> {
		escape(&mut self.scratch, data.as_bytes(), TEXT_SPECIALS);
		self.commit()
	}

	fn write_cdata(&mut self, data: &str) -> Result<()> {
		put_cdata(&mut self.scratch, data);
		self.commit()
	}

	fn write_comment(&mut self, data: &str) -> Result<()> {
		put_comment(&mut self.scratch, data)?;
		self.commit()
	}

	fn write_pi(&mut self, target: &NCNameStr, data: Option<&str>) -> Result<()> {
		put_pi(&mut self.scratch, target, data)?;
		self.commit()
	}

	fn write_raw_indentation(&mut self, text: &str) -> Result<()> {
		self.scratch.put_slice(text.as_bytes());
		self.commit()
	}
}
