//! 占位符表达式：递归下降解析为 AST
//!
//! ```text
//! placeholder := "{step_" digits "_result" accessor* "}"
//! accessor    := "." identifier | "." digits | "[" digits "]"
//! ```
//!
//! 只有以 `{step_<digits>_result` 开头的文本才算占位符，其余花括号（如内嵌 JSON）原样保留。
//! 一旦识别出该前缀，之后任何语法外的字符都直接报 UnsupportedExpression：
//! 解析结果只能是纯数据查找，不存在可执行的部分。

use std::fmt;

use crate::context::ResolveError;

const OPEN: &str = "{step_";
const RESULT: &str = "_result";

/// 路径上的一次访问
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// 映射按键取值
    Field(String),
    /// 序列按下标取值
    Index(usize),
}

/// 对某一步结果的引用，path 为空表示整个结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub step: usize,
    pub path: Vec<Accessor>,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{step_{}_result", self.step)?;
        for accessor in &self.path {
            match accessor {
                Accessor::Field(name) => write!(f, ".{name}")?,
                Accessor::Index(i) => write!(f, "[{i}]")?,
            }
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// 一个字符串参数解析后的片段序列
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, ResolveError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(pos) = rest.find(OPEN) {
            literal.push_str(&rest[..pos]);
            let candidate = &rest[pos..];
            match Parser::new(candidate).placeholder()? {
                Some((placeholder, consumed)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                    rest = &candidate[consumed..];
                }
                None => {
                    literal.push_str(OPEN);
                    rest = &candidate[OPEN.len()..];
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_placeholders(&self) -> bool {
        self.placeholders().next().is_some()
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    body_start: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            body_start: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    /// 报错时展示的表达式原文：到第一个 `}` 为止
    fn expression(&self) -> &'a str {
        match self.src.find('}') {
            Some(end) => &self.src[..=end],
            None => self.src,
        }
    }

    fn unsupported(&self, reason: impl Into<String>) -> ResolveError {
        ResolveError::UnsupportedExpression {
            expression: self.expression().to_string(),
            reason: reason.into(),
        }
    }

    /// 遇到语法外字符：优先报出表达式里最能说明问题的结构（调用 > 运算 > 比较）
    fn reject(&self, c: char) -> ResolveError {
        let body = self.expression().get(self.body_start..).unwrap_or("");
        if body.contains(|ch| ch == '(' || ch == ')') {
            return self.unsupported("method and function calls are not allowed");
        }
        if let Some(op) = body.chars().find(|ch| matches!(ch, '+' | '-' | '*' | '/' | '%' | '^')) {
            return self.unsupported(format!("arithmetic operator `{op}` is not allowed"));
        }
        if let Some(op) = body
            .chars()
            .find(|ch| matches!(ch, '<' | '>' | '=' | '!' | '&' | '|'))
        {
            return self.unsupported(format!("comparison operator `{op}` is not allowed"));
        }
        let reason = match c {
            ':' => "slicing is not allowed".to_string(),
            '\'' | '"' => "string literals are not allowed".to_string(),
            ',' => "argument lists are not allowed".to_string(),
            c if c.is_whitespace() => "whitespace is not allowed".to_string(),
            c => format!("unexpected character `{c}`"),
        };
        self.unsupported(reason)
    }

    /// Ok(None)：前缀不完整，不是占位符
    fn placeholder(mut self) -> Result<Option<(Placeholder, usize)>, ResolveError> {
        if !self.eat(OPEN) {
            return Ok(None);
        }
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() || !self.eat(RESULT) {
            return self.malformed_prefix();
        }
        self.body_start = self.pos;
        let step = digits
            .parse::<usize>()
            .map_err(|_| self.unsupported(format!("step index {digits} is out of range")))?;

        let mut path = Vec::new();
        loop {
            match self.bump() {
                Some('}') => return Ok(Some((Placeholder { step, path }, self.pos))),
                Some('.') => path.push(self.dot_segment()?),
                Some('[') => path.push(self.bracket_index()?),
                Some(c) => return Err(self.reject(c)),
                None => return Err(self.unsupported("placeholder is not closed with `}`")),
            }
        }
    }

    /// `{step_` 之后不是「数字 + _result」：看起来像占位符的报不支持的表达式，否则按普通文本处理
    fn malformed_prefix(&mut self) -> Result<Option<(Placeholder, usize)>, ResolveError> {
        let src = self.src;
        let Some(end) = src.find('}') else {
            return Ok(None);
        };
        let body = &src[OPEN.len()..end];
        if body.contains('{') {
            return Ok(None);
        }
        let has_operator = body.contains(|c| {
            matches!(
                c,
                '(' | ')' | '+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '!' | '&' | '|'
            )
        });
        if !has_operator && !body.contains(RESULT) {
            return Ok(None);
        }
        self.body_start = OPEN.len();
        match body
            .chars()
            .find(|&c| !(is_ident_continue(c) || matches!(c, '.' | '[' | ']')))
        {
            Some(c) => Err(self.reject(c)),
            None => Err(self.unsupported("step index must be a non-negative integer literal")),
        }
    }

    fn dot_segment(&mut self) -> Result<Accessor, ResolveError> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                if self.peek().is_some_and(is_ident_continue) {
                    return Err(self.unsupported(format!(
                        "path segment starting with `{digits}` is neither an index nor a name"
                    )));
                }
                self.index(digits)
            }
            Some(c) if is_ident_start(c) => {
                Ok(Accessor::Field(self.take_while(is_ident_continue).to_string()))
            }
            Some('.') | Some('}') | Some('[') => Err(self.unsupported("empty path segment")),
            Some(c) => Err(self.reject(c)),
            None => Err(self.unsupported("placeholder is not closed with `}`")),
        }
    }

    fn bracket_index(&mut self) -> Result<Accessor, ResolveError> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(match self.peek() {
                Some(c) if is_ident_start(c) => {
                    self.unsupported("bracket index must be an integer literal")
                }
                Some(c) => self.reject(c),
                None => self.unsupported("`[` is not closed with `]`"),
            });
        }
        let accessor = self.index(digits)?;
        match self.bump() {
            Some(']') => Ok(accessor),
            Some(c) => Err(self.reject(c)),
            None => Err(self.unsupported("`[` is not closed with `]`")),
        }
    }

    fn index(&self, digits: &str) -> Result<Accessor, ResolveError> {
        digits
            .parse::<usize>()
            .map(Accessor::Index)
            .map_err(|_| self.unsupported(format!("index {digits} is out of range")))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
