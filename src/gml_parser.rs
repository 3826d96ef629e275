//! GML topology graph parser.
//!
//! Shadow consumes internet-like topologies as GML: an attributed
//! undirected graph of network nodes and latency/bandwidth edges. The
//! parser is a small hand-rolled lexer plus recursive-descent reader; the
//! format is simple enough that pulling in a graph crate buys nothing.
//!
//! Validation is strict because Shadow's own errors at run time are
//! opaque: every node needs an address, addresses must be unique, edges
//! must reference real nodes, and every node that hosts processes needs a
//! self-loop edge (Shadow routes intra-host traffic over it).

use color_eyre::eyre::{eyre, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

/// A node in the topology graph.
#[derive(Debug, Clone)]
pub struct GmlNode {
    pub id: u32,
    pub label: Option<String>,
    pub ip: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl GmlNode {
    pub fn is_valid_ip(ip: &str) -> bool {
        ip.parse::<std::net::Ipv4Addr>().is_ok()
    }

    pub fn get_ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// Autonomous-system identifier, when the graph declares one.
    pub fn as_number(&self) -> Option<&str> {
        self.attributes
            .get("AS")
            .or_else(|| self.attributes.get("as"))
            .map(|s| s.as_str())
    }
}

/// An edge (link) in the topology graph.
#[derive(Debug, Clone)]
pub struct GmlEdge {
    pub source: u32,
    pub target: u32,
    pub attributes: BTreeMap<String, String>,
}

impl GmlEdge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// A complete parsed topology graph.
#[derive(Debug, Clone, Default)]
pub struct GmlGraph {
    pub nodes: Vec<GmlNode>,
    pub edges: Vec<GmlEdge>,
    pub attributes: BTreeMap<String, String>,
}

/// Extract the node address from its attribute bag. Several key spellings
/// are in the wild; the first valid one wins.
fn parse_ip(attributes: &BTreeMap<String, String>) -> Option<String> {
    for key in ["ip", "ip_addr", "address", "ip_address"] {
        if let Some(value) = attributes.get(key) {
            let cleaned = value.trim_matches('"');
            if GmlNode::is_valid_ip(cleaned) {
                return Some(cleaned.to_string());
            }
            log::warn!("Invalid IP address '{}' in attribute '{}'", cleaned, key);
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Number(String),
    String(String),
    LeftBracket,
    RightBracket,
    Eof,
}

struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();
        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.current_char, Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current_char {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char {
            if ch == '"' {
                self.advance();
                return Ok(result);
            }
            if ch == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char {
                    match escaped {
                        'n' => result.push('\n'),
                        't' => result.push('\t'),
                        'r' => result.push('\r'),
                        '\\' => result.push('\\'),
                        '"' => result.push('"'),
                        _ => {
                            result.push('\\');
                            result.push(escaped);
                        }
                    }
                    self.advance();
                }
            } else {
                result.push(ch);
                self.advance();
            }
        }

        Err(eyre!("Unterminated string literal"))
    }

    fn read_bare_word(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '+') {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            self.skip_whitespace();

            match self.current_char {
                None => return Ok(Token::Eof),
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                Some('[') => {
                    self.advance();
                    return Ok(Token::LeftBracket);
                }
                Some(']') => {
                    self.advance();
                    return Ok(Token::RightBracket);
                }
                Some('"') => return Ok(Token::String(self.read_string()?)),
                Some(ch) if ch.is_alphabetic() || ch == '_' => {
                    return Ok(Token::Identifier(self.read_bare_word()));
                }
                Some(ch) if ch.is_numeric() || ch == '-' || ch == '+' => {
                    return Ok(Token::Number(self.read_bare_word()));
                }
                Some(ch) => return Err(eyre!("Unexpected character: '{}'", ch)),
            }
        }
    }
}

struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    fn new(mut lexer: Lexer) -> Result<Self> {
        let current_token = lexer.next_token()?;
        Ok(Self {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<()> {
        match &self.current_token {
            Token::Identifier(id) if id == expected => self.advance(),
            other => Err(eyre!("Expected identifier '{}', found {:?}", expected, other)),
        }
    }

    fn expect_left_bracket(&mut self) -> Result<()> {
        match self.current_token {
            Token::LeftBracket => self.advance(),
            _ => Err(eyre!("Expected '[', found {:?}", self.current_token)),
        }
    }

    fn expect_right_bracket(&mut self) -> Result<()> {
        match self.current_token {
            Token::RightBracket => self.advance(),
            _ => Err(eyre!("Expected ']', found {:?}", self.current_token)),
        }
    }

    fn parse_value(&mut self) -> Result<String> {
        match &self.current_token {
            Token::Identifier(val) | Token::Number(val) | Token::String(val) => {
                let result = val.clone();
                self.advance()?;
                Ok(result)
            }
            other => Err(eyre!("Expected value, found {:?}", other)),
        }
    }

    fn parse_node(&mut self) -> Result<GmlNode> {
        self.expect_identifier("node")?;
        self.expect_left_bracket()?;

        let mut id = None;
        let mut label = None;
        let mut attributes = BTreeMap::new();

        while self.current_token != Token::RightBracket {
            match &self.current_token {
                Token::Identifier(key) => {
                    let key = key.clone();
                    self.advance()?;
                    let value = self.parse_value()?;
                    match key.as_str() {
                        "id" => {
                            id = Some(
                                value
                                    .parse::<u32>()
                                    .map_err(|_| eyre!("Invalid node id: {}", value))?,
                            );
                        }
                        "label" => label = Some(value),
                        _ => {
                            attributes.insert(key, value);
                        }
                    }
                }
                other => return Err(eyre!("Expected attribute name in node, found {:?}", other)),
            }
        }
        self.expect_right_bracket()?;

        let id = id.ok_or_else(|| eyre!("Node missing required 'id' attribute"))?;
        let ip = parse_ip(&attributes);

        Ok(GmlNode {
            id,
            label,
            ip,
            attributes,
        })
    }

    fn parse_edge(&mut self) -> Result<GmlEdge> {
        self.expect_identifier("edge")?;
        self.expect_left_bracket()?;

        let mut source = None;
        let mut target = None;
        let mut attributes = BTreeMap::new();

        while self.current_token != Token::RightBracket {
            match &self.current_token {
                Token::Identifier(key) => {
                    let key = key.clone();
                    self.advance()?;
                    let value = self.parse_value()?;
                    match key.as_str() {
                        "source" => {
                            source = Some(
                                value
                                    .parse::<u32>()
                                    .map_err(|_| eyre!("Invalid edge source: {}", value))?,
                            );
                        }
                        "target" => {
                            target = Some(
                                value
                                    .parse::<u32>()
                                    .map_err(|_| eyre!("Invalid edge target: {}", value))?,
                            );
                        }
                        _ => {
                            // packet_loss arrives as "1%" in some graphs
                            let processed = if key == "packet_loss" && value.ends_with('%') {
                                match value.trim_end_matches('%').parse::<f64>() {
                                    Ok(pct) => format!("{}", pct / 100.0),
                                    Err(_) => value,
                                }
                            } else {
                                value
                            };
                            attributes.insert(key, processed);
                        }
                    }
                }
                other => return Err(eyre!("Expected attribute name in edge, found {:?}", other)),
            }
        }
        self.expect_right_bracket()?;

        Ok(GmlEdge {
            source: source.ok_or_else(|| eyre!("Edge missing required 'source' attribute"))?,
            target: target.ok_or_else(|| eyre!("Edge missing required 'target' attribute"))?,
            attributes,
        })
    }

    fn parse_graph(&mut self) -> Result<GmlGraph> {
        self.expect_identifier("graph")?;
        self.expect_left_bracket()?;

        let mut graph = GmlGraph::default();

        while self.current_token != Token::RightBracket {
            match &self.current_token {
                Token::Identifier(keyword) => match keyword.as_str() {
                    "node" => graph.nodes.push(self.parse_node()?),
                    "edge" => graph.edges.push(self.parse_edge()?),
                    _ => {
                        let key = keyword.clone();
                        self.advance()?;
                        let value = self.parse_value()?;
                        graph.attributes.insert(key, value);
                    }
                },
                other => return Err(eyre!("Expected keyword in graph, found {:?}", other)),
            }
        }
        self.expect_right_bracket()?;

        Ok(graph)
    }
}

/// Parse a GML string.
pub fn parse_gml_str(content: &str) -> Result<GmlGraph> {
    let lexer = Lexer::new(content);
    let mut parser = Parser::new(lexer)?;
    parser.parse_graph()
}

/// Parse a GML file.
pub fn parse_gml_file(path: &str) -> Result<GmlGraph> {
    let content =
        fs::read_to_string(path).map_err(|e| eyre!("Failed to read GML file '{}': {}", path, e))?;
    parse_gml_str(&content)
}

/// Validate the topology graph before any agent placement happens.
///
/// Every failure here is fatal at plan time; the messages name the
/// offending node so the operator can fix the graph directly.
pub fn validate_topology(graph: &GmlGraph) -> Result<(), String> {
    let mut node_ids = BTreeSet::new();
    for node in &graph.nodes {
        if !node_ids.insert(node.id) {
            return Err(format!("Duplicate node ID: {}", node.id));
        }
    }

    for edge in &graph.edges {
        if !node_ids.contains(&edge.source) {
            return Err(format!(
                "Edge references non-existent source node: {}",
                edge.source
            ));
        }
        if !node_ids.contains(&edge.target) {
            return Err(format!(
                "Edge references non-existent target node: {}",
                edge.target
            ));
        }
    }

    if graph.nodes.len() > 1 && graph.edges.iter().all(|e| e.is_self_loop()) {
        return Err(
            "Graph has multiple nodes but no connecting edges - network is disconnected"
                .to_string(),
        );
    }

    // Shadow requires a self-loop on every node that hosts processes;
    // without one, intra-host traffic has no route and the simulator
    // aborts with an unhelpful message.
    let looped: BTreeSet<u32> = graph
        .edges
        .iter()
        .filter(|e| e.is_self_loop())
        .map(|e| e.source)
        .collect();
    for node in &graph.nodes {
        if !looped.contains(&node.id) {
            return Err(format!(
                "Node {} has no self-loop edge; add 'edge [ source {} target {} latency \"1ms\" ]' to the graph",
                node.id, node.id, node.id
            ));
        }
    }

    // Declared addresses must be unique, and where an AS is declared all
    // of its nodes must agree on the /16 the allocator will extend.
    let mut seen_ips: BTreeMap<String, u32> = BTreeMap::new();
    let mut as_prefixes: BTreeMap<String, (String, u32)> = BTreeMap::new();
    for node in &graph.nodes {
        if let Some(ip) = node.get_ip() {
            if !GmlNode::is_valid_ip(ip) {
                return Err(format!("Invalid IP address '{}' on node {}", ip, node.id));
            }
            if let Some(other) = seen_ips.insert(ip.to_string(), node.id) {
                return Err(format!(
                    "Duplicate IP address '{}' on nodes {} and {}",
                    ip, other, node.id
                ));
            }
            if let Some(as_number) = node.as_number() {
                let prefix = ip.rsplitn(3, '.').nth(2).unwrap_or(ip).to_string();
                match as_prefixes.get(as_number) {
                    None => {
                        as_prefixes.insert(as_number.to_string(), (prefix, node.id));
                    }
                    Some((existing, first_node)) if *existing != prefix => {
                        return Err(format!(
                            "AS {} declares inconsistent subnets: node {} is in {}.x.x but node {} is in {}.x.x",
                            as_number, first_node, existing, node.id, prefix
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    Ok(())
}

impl GmlGraph {
    /// Re-emit the graph in the normalized form Shadow consumes. Numeric
    /// attributes (bandwidth in Mbit, packet loss fractions) are written
    /// unquoted, everything else quoted; attribute maps are ordered, so
    /// the output is byte-stable for a given input graph.
    pub fn to_gml_string(&self) -> String {
        fn render_attr(out: &mut String, indent: &str, key: &str, value: &str) {
            let (processed, quote) = match key {
                "bandwidth" => (normalize_bandwidth(value), false),
                "packet_loss" => (value.to_string(), false),
                _ => (value.to_string(), true),
            };
            if quote {
                out.push_str(&format!("{}{} \"{}\"\n", indent, key, processed));
            } else {
                out.push_str(&format!("{}{} {}\n", indent, key, processed));
            }
        }

        let mut out = String::from("graph [\n");
        for (key, value) in &self.attributes {
            out.push_str(&format!("  {} {}\n", key, value));
        }
        for node in &self.nodes {
            out.push_str("  node [\n");
            out.push_str(&format!("    id {}\n", node.id));
            if let Some(label) = &node.label {
                out.push_str(&format!("    label \"{}\"\n", label));
            }
            for (key, value) in &node.attributes {
                render_attr(&mut out, "    ", key, value);
            }
            out.push_str("  ]\n");
        }
        for edge in &self.edges {
            out.push_str("  edge [\n");
            out.push_str(&format!("    source {}\n", edge.source));
            out.push_str(&format!("    target {}\n", edge.target));
            for (key, value) in &edge.attributes {
                render_attr(&mut out, "    ", key, value);
            }
            out.push_str("  ]\n");
        }
        out.push_str("]\n");
        out
    }
}

/// Shadow wants bandwidth as bare Mbit numbers.
fn normalize_bandwidth(value: &str) -> String {
    if let Some(gbit) = value.strip_suffix("Gbit") {
        if let Ok(parsed) = gbit.parse::<f64>() {
            return format!("{}", parsed * 1000.0);
        }
    }
    if let Some(mbit) = value.strip_suffix("Mbit") {
        return mbit.to_string();
    }
    value.to_string()
}

/// Group node ids by autonomous system, sorted for stable iteration.
pub fn autonomous_systems(graph: &GmlGraph) -> BTreeMap<String, Vec<u32>> {
    let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for node in &graph.nodes {
        let key = node
            .as_number()
            .map(|a| a.to_string())
            .unwrap_or_else(|| format!("unassigned-{}", node.id));
        groups.entry(key).or_default().push(node.id);
    }
    for ids in groups.values_mut() {
        ids.sort_unstable();
    }
    groups
}
