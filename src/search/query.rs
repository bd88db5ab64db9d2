//! Query preprocessing for the keyword leg of a search.

use crate::lexical::tokenize;

/// Technical abbreviations and their spelled-out forms.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("ai", "artificial intelligence"),
    ("api", "application programming interface"),
    ("cli", "command line interface"),
    ("cnn", "convolutional neural network"),
    ("cpu", "central processing unit"),
    ("crud", "create read update delete"),
    ("css", "cascading style sheets"),
    ("cv", "computer vision"),
    ("dbms", "database management system"),
    ("dl", "deep learning"),
    ("dns", "domain name system"),
    ("ftp", "file transfer protocol"),
    ("gpu", "graphics processing unit"),
    ("gui", "graphical user interface"),
    ("html", "hypertext markup language"),
    ("http", "hypertext transfer protocol"),
    ("https", "hypertext transfer protocol secure"),
    ("ide", "integrated development environment"),
    ("ip", "internet protocol"),
    ("js", "javascript"),
    ("json", "javascript object notation"),
    ("lstm", "long short term memory"),
    ("ml", "machine learning"),
    ("mvc", "model view controller"),
    ("nlp", "natural language processing"),
    ("nosql", "not only sql"),
    ("oop", "object oriented programming"),
    ("orm", "object relational mapping"),
    ("os", "operating system"),
    ("ram", "random access memory"),
    ("rdbms", "relational database management system"),
    ("rest", "representational state transfer"),
    ("rnn", "recurrent neural network"),
    ("rom", "read only memory"),
    ("sdk", "software development kit"),
    ("soap", "simple object access protocol"),
    ("sql", "structured query language"),
    ("ssh", "secure shell"),
    ("ssl", "secure sockets layer"),
    ("tcp", "transmission control protocol"),
    ("tls", "transport layer security"),
    ("udp", "user datagram protocol"),
    ("ui", "user interface"),
    ("uri", "uniform resource identifier"),
    ("url", "uniform resource locator"),
    ("ux", "user experience"),
    ("xml", "extensible markup language"),
];

/// Look up the expansion of a lower-case abbreviation.
pub fn expansion_of(token: &str) -> Option<&'static str> {
    ABBREVIATIONS
        .binary_search_by(|(abbr, _)| (*abbr).cmp(token))
        .ok()
        .map(|i| ABBREVIATIONS[i].1)
}

/// Append the expansion of every known abbreviation after the original terms.
///
/// Terms are de-duplicated in first-seen order; the result is plain text fed
/// to the keyword index.
pub fn expand_abbreviations(query: &str) -> String {
    let original = tokenize(query);
    let mut terms: Vec<String> = Vec::with_capacity(original.len());

    let push = |term: &str, terms: &mut Vec<String>| {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    };

    for token in &original {
        push(token, &mut terms);
    }
    for token in &original {
        if let Some(expansion) = expansion_of(token) {
            for word in expansion.split_whitespace() {
                push(word, &mut terms);
            }
        }
    }

    terms.join(" ")
}
