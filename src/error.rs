/*!
# Error types

This module holds the error types returned by the writer. With the
exception of [`Error::Io`], every error is the synchronous result of an
offending call; all errors are fatal. Once a writer has returned an error,
the output stream is in a partial state which cannot be rolled back, and
the writer will keep returning the same error for every further call.
*/
use std::error;
use std::fmt;
use std::io;
use std::ops::Deref;
use std::result::Result as StdResult;
use std::sync::Arc;

use crate::strings::{NCName, NameError};

/// Violation of a namespace binding constraint.
///
/// These can only occur in non-repairing mode, with the exception of
/// [`NsError::DuplicateAttribute`], which is structural and checked in both
/// modes.
#[derive(Debug, Clone, PartialEq)]
pub enum NsError {
	/// A write referenced a namespace URI or prefix/URI pair which is
	/// neither in scope nor inherited from the root context.
	Undeclared {
		/// The unbound namespace URI.
		uri: String,
	},

	/// Attempt to write the default namespace with a URI different from
	/// the one declared for this element.
	ConflictingDefault {
		/// The URI declared for this element, if any.
		declared: Option<String>,
		/// The URI the caller attempted to write.
		requested: String,
	},

	/// A namespace was declared on an element but never written by the
	/// time the element closed.
	UnusedDeclaration {
		/// The declared prefix; `None` for the default namespace.
		prefix: Option<NCName>,
	},

	/// The same `(uri, localname)` attribute was written twice on one
	/// element.
	DuplicateAttribute {
		/// Local name of the attribute.
		local_name: NCName,
		/// Value of the earlier write, for diagnostics.
		previous: String,
	},

	/// A prefix/URI combination does not match the binding active in the
	/// nearest enclosing scope.
	MisboundPrefix {
		/// The prefix in question; `None` for the empty prefix.
		prefix: Option<NCName>,
		/// The URI the caller attempted to use it for.
		requested: String,
	},
}

impl error::Error for NsError {}

impl fmt::Display for NsError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Undeclared { uri } => {
				write!(f, "undeclared namespace write: {:?}", uri)
			}
			Self::ConflictingDefault {
				declared: Some(declared),
				requested,
			} => write!(
				f,
				"conflicting default namespace: {:?} declared, {:?} written",
				declared, requested
			),
			Self::ConflictingDefault {
				declared: None,
				requested,
			} => write!(
				f,
				"default namespace {:?} written without declaration",
				requested
			),
			Self::UnusedDeclaration {
				prefix: Some(prefix),
			} => write!(f, "namespace prefix {:?} declared but never written", prefix.as_str()),
			Self::UnusedDeclaration { prefix: None } => {
				f.write_str("default namespace declared but never written")
			}
			Self::DuplicateAttribute {
				local_name,
				previous,
			} => write!(
				f,
				"duplicate attribute {:?} (previous value {:?})",
				local_name.as_str(),
				previous
			),
			Self::MisboundPrefix { prefix, requested } => write!(
				f,
				"prefix {:?} is not bound to {:?} in the current scope",
				prefix.as_ref().map(|x| x.as_str()).unwrap_or(""),
				requested
			),
		}
	}
}

/// Structural misuse of the writer API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentError {
	/// Emitted if an XML declaration is placed after other content or if
	/// multiple XML declarations are placed.
	MisplacedXmlDeclaration,

	/// Emitted if any content is placed after the end of the last element.
	EndOfDocument,

	/// Emitted if text is placed outside the root element.
	TextNotAllowed,

	/// Emitted if an attribute is placed outside an element header.
	AttributeNotAllowed,

	/// Emitted if a namespace declaration is placed outside an element
	/// header.
	NamespaceNotAllowed,

	/// Emitted on an element close without a matching open element.
	ElementFootNotAllowed,

	/// Emitted if the writer is finished while elements are still open or
	/// before a root element was written.
	DocumentIncomplete,

	/// Comment content contained `--` or ended with `-`.
	IllegalComment,

	/// Processing instruction data contained `?>`.
	IllegalProcessingInstruction,
}

impl error::Error for DocumentError {}

impl fmt::Display for DocumentError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::MisplacedXmlDeclaration => f.write_str("misplaced XML declaration"),
			Self::EndOfDocument => f.write_str("no content allowed after end of root element"),
			Self::TextNotAllowed => f.write_str("text not allowed outside the root element"),
			Self::AttributeNotAllowed => {
				f.write_str("attributes not allowed outside element headers")
			}
			Self::NamespaceNotAllowed => {
				f.write_str("namespace declarations not allowed outside element headers")
			}
			Self::ElementFootNotAllowed => f.write_str("no open element to close"),
			Self::DocumentIncomplete => f.write_str("document incomplete"),
			Self::IllegalComment => f.write_str("comment must not contain -- or end with -"),
			Self::IllegalProcessingInstruction => {
				f.write_str("processing instruction data must not contain ?>")
			}
		}
	}
}

/// [`std::sync::Arc`]-based wrapper around [`std::io::Error`] to allow
/// cloning.
#[derive(Clone)]
pub struct IoErrorWrapper(Arc<io::Error>);

impl IoErrorWrapper {
	fn wrap(e: io::Error) -> IoErrorWrapper {
		IoErrorWrapper(Arc::new(e))
	}
}

impl fmt::Debug for IoErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(&**self, f)
	}
}

impl fmt::Display for IoErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&**self, f)
	}
}

impl PartialEq for IoErrorWrapper {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl AsRef<io::Error> for IoErrorWrapper {
	fn as_ref(&self) -> &io::Error {
		&*self.0
	}
}

impl Deref for IoErrorWrapper {
	type Target = io::Error;

	fn deref(&self) -> &io::Error {
		&*self.0
	}
}

/// Error types which may be returned from the writer.
///
/// All errors are fatal: after the first error, the writer is poisoned and
/// returns the same error from every further call. Continuing to write
/// after an error would produce ill-formed XML.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// An I/O error was encountered while writing to the sink.
	Io(IoErrorWrapper),

	/// A namespace binding constraint was violated.
	Ns(NsError),

	/// The writer API was used out of sequence.
	Document(DocumentError),

	/// A prefix or local name does not conform to the NCName production.
	BadName(NameError),
}

pub type Result<T> = StdResult<T, Error>;

impl Error {
	pub fn io(e: io::Error) -> Error {
		Error::Io(IoErrorWrapper::wrap(e))
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::io(e)
	}
}

impl From<NsError> for Error {
	fn from(e: NsError) -> Error {
		Error::Ns(e)
	}
}

impl From<DocumentError> for Error {
	fn from(e: DocumentError) -> Error {
		Error::Document(e)
	}
}

impl From<NameError> for Error {
	fn from(e: NameError) -> Error {
		Error::BadName(e)
	}
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Ns(e) => write!(f, "not namespace-well-formed: {}", e),
			Error::Document(e) => write!(f, "invalid document structure: {}", e),
			Error::BadName(e) => write!(f, "invalid name: {}", e),
			Error::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(&**e),
			Error::Ns(e) => Some(e),
			Error::Document(e) => Some(e),
			Error::BadName(e) => Some(e),
		}
	}
}
