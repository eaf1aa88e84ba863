//! Hand-rolled recursive-descent parser driving `crate::ast` from the
//! token stream produced by `crate::lexer`. The front end is explicitly
//! out of scope; this parser exists only so the rest of the
//! pipeline (checker, borrow checker, monomorphizer, emitter) has a real
//! producer to drive end-to-end in tests. Structured as plain recursive
//! functions rather than a combinator-based grammar, which does not scale
//! cleanly to expression-precedence parsing.

use crate::ast::*;
use crate::lexer::{Span, Token};

use super::{ParseError, ParseState};

pub struct Parser {
    state: ParseState<Token>,
    ids: NodeIdGen,
    /// Suppresses struct-literal parsing (`Name { ... }`) while parsing the
    /// condition of `if`/`while`/`when`/`for`, so the opening `{` of the
    /// body is never swallowed as a struct initializer's brace — the same
    /// ambiguity C-like languages with brace blocks and brace-initialized
    /// structs all have to resolve one way or another.
    forbid_struct_literal: bool,
}

type PResult<T> = Result<T, ParseError>;

pub fn parse_module(tokens: Vec<Token>, path: Vec<String>) -> PResult<Module> {
    let mut parser = Parser {
        state: ParseState::new(tokens),
        ids: NodeIdGen::new(),
        forbid_struct_literal: false,
    };
    parser.parse_module(path)
}

impl Parser {
    fn next_id(&mut self) -> NodeId {
        self.ids.next()
    }

    fn peek(&self) -> Option<Token> {
        self.state.peek()
    }

    fn bump(&mut self) -> Option<Token> {
        self.state.next()
    }

    fn current_span(&self) -> PResult<Span> {
        self.peek()
            .map(|t| token_span(&t))
            .or_else(|| self.state.last_token().map(|t| token_span(&t)))
            .ok_or_else(|| ParseError::eof("token"))
    }

    fn eof_err(item: &str) -> ParseError {
        ParseError::eof(item)
    }

    /// Consumes the next token if the predicate matches, else leaves the
    /// cursor untouched and reports an error.
    fn eat(&mut self, pred: impl Fn(&Token) -> bool, expected: &str) -> PResult<Token> {
        match self.peek() {
            Some(tok) if pred(&tok) => {
                self.bump();
                Ok(tok)
            }
            Some(tok) => Err(ParseError {
                message: format!("expected {expected}, got {:?}", tok),
                position: Some(token_span(&tok)),
            }),
            None => Err(Self::eof_err(expected)),
        }
    }

    fn check(&self, pred: impl Fn(&Token) -> bool) -> bool {
        self.peek().map(|t| pred(&t)).unwrap_or(false)
    }

    fn eat_if(&mut self, pred: impl Fn(&Token) -> bool) -> bool {
        if self.check(pred) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_id(&mut self) -> PResult<(String, Span)> {
        match self.peek() {
            Some(Token::Id { value, position }) => {
                self.bump();
                Ok((value, position))
            }
            Some(tok) => Err(ParseError {
                message: format!("expected identifier, got {:?}", tok),
                position: Some(token_span(&tok)),
            }),
            None => Err(Self::eof_err("identifier")),
        }
    }

    // ---- module & items -------------------------------------------------

    fn parse_module(&mut self, path: Vec<String>) -> PResult<Module> {
        let start = self.current_span().unwrap_or_default();
        let id = self.next_id();
        let mut items = vec![];
        while self.peek().is_some() {
            items.push(self.parse_item()?);
        }
        Ok(Module {
            id,
            path,
            items,
            span: start,
        })
    }

    fn parse_is_pub(&mut self) -> bool {
        self.eat_if(|t| matches!(t, Token::PubKeyword { .. }))
    }

    fn parse_item(&mut self) -> PResult<Item> {
        let is_pub = self.parse_is_pub();
        match self.peek() {
            Some(Token::FnKeyword { .. }) => self.parse_func_decl(is_pub).map(Item::Func),
            Some(Token::StructKeyword { .. }) => self.parse_struct_decl(is_pub).map(Item::Struct),
            Some(Token::EnumKeyword { .. }) => self.parse_enum_decl(is_pub).map(Item::Enum),
            Some(Token::BehaviorKeyword { .. }) => {
                self.parse_behavior_decl(is_pub).map(Item::Behavior)
            }
            Some(Token::ImplKeyword { .. }) => self.parse_impl_decl().map(Item::Impl),
            Some(Token::ClassKeyword { .. }) => self.parse_class_decl(is_pub).map(Item::Class),
            Some(Token::Const { .. }) => self.parse_const_decl(is_pub).map(Item::Const),
            Some(Token::UseKeyword { .. }) => self.parse_use_decl().map(Item::Use),
            Some(Token::TypeKeyword { .. }) => {
                self.parse_type_alias_decl(is_pub).map(Item::TypeAlias)
            }
            Some(tok) => Err(ParseError {
                message: format!("expected a top-level item, got {:?}", tok),
                position: Some(token_span(&tok)),
            }),
            None => Err(Self::eof_err("item")),
        }
    }

    fn parse_type_params(&mut self) -> PResult<Vec<TypeParam>> {
        let mut params = vec![];
        if self.eat_if(|t| matches!(t, Token::LBracket { .. })) {
            loop {
                let (name, _) = self.eat_id()?;
                let mut bounds = vec![];
                if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
                    loop {
                        let (bound, _) = self.eat_id()?;
                        bounds.push(bound);
                        if !self.eat_if(|t| matches!(t, Token::Plus { .. })) {
                            break;
                        }
                    }
                }
                params.push(TypeParam { name, bounds });
                if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                    break;
                }
            }
            self.eat(|t| matches!(t, Token::RBracket { .. }), "]")?;
        }
        Ok(params)
    }

    fn parse_where_clause(&mut self) -> PResult<Vec<TypeParam>> {
        // `where T: Behavior + Other` — reuses the same bound grammar as
        // inline type params.
        if !self.eat_if(|t| matches!(t, Token::Id { value, .. } if value == "where")) {
            return Ok(vec![]);
        }
        let mut constraints = vec![];
        loop {
            let (name, _) = self.eat_id()?;
            self.eat(|t| matches!(t, Token::Colon { .. }), ":")?;
            let mut bounds = vec![];
            loop {
                let (bound, _) = self.eat_id()?;
                bounds.push(bound);
                if !self.eat_if(|t| matches!(t, Token::Plus { .. })) {
                    break;
                }
            }
            constraints.push(TypeParam { name, bounds });
            if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                break;
            }
        }
        Ok(constraints)
    }

    fn parse_func_params(&mut self) -> PResult<Vec<FuncParam>> {
        self.eat(|t| matches!(t, Token::LParen { .. }), "(")?;
        let mut params = vec![];
        while !self.check(|t| matches!(t, Token::RParen { .. })) {
            // `self` / `mut self` as a bare receiver, desugared to a
            // parameter named `self` with an inferred `Self` type.
            if self.check(|t| matches!(t, Token::SelfKeyword { .. })) {
                self.bump();
                params.push(FuncParam {
                    name: "self".into(),
                    annotated_type: TypeExpr::Name {
                        id: self.next_id(),
                        path: vec![],
                        name: "Self".into(),
                        type_args: vec![],
                        span: Span::default(),
                    },
                    is_mut: false,
                });
            } else {
                let is_mut = self.eat_if(|t| matches!(t, Token::Mut { .. }));
                let (name, _) = self.eat_id()?;
                self.eat(|t| matches!(t, Token::Colon { .. }), ":")?;
                let annotated_type = self.parse_type_expr()?;
                params.push(FuncParam {
                    name,
                    annotated_type,
                    is_mut,
                });
            }
            if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                break;
            }
        }
        self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
        Ok(params)
    }

    fn parse_return_type(&mut self) -> PResult<TypeExpr> {
        if self.eat_if(|t| matches!(t, Token::SmallRightArrow { .. })) {
            self.parse_type_expr()
        } else {
            Ok(TypeExpr::Unit {
                id: self.next_id(),
                span: Span::default(),
            })
        }
    }

    fn parse_func_sig(&mut self) -> PResult<FuncSig> {
        self.eat(|t| matches!(t, Token::FnKeyword { .. }), "fn")?;
        let (name, _) = self.eat_id()?;
        let type_params = self.parse_type_params()?;
        let params = self.parse_func_params()?;
        let return_type = self.parse_return_type()?;
        let where_constraints = self.parse_where_clause()?;
        Ok(FuncSig {
            name,
            type_params,
            params,
            return_type,
            where_constraints,
        })
    }

    fn parse_func_decl(&mut self, is_pub: bool) -> PResult<FuncDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        let sig = self.parse_func_sig()?;
        let body = if self.check(|t| matches!(t, Token::LBrace { .. })) {
            Some(self.parse_block_expr()?)
        } else {
            self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
            None
        };
        Ok(FuncDecl {
            id,
            sig,
            is_pub,
            body,
            span: start,
        })
    }

    fn parse_struct_decl(&mut self, is_pub: bool) -> PResult<StructDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::StructKeyword { .. }), "struct")?;
        let is_union = self.eat_if(|t| matches!(t, Token::Id { value, .. } if value == "union"));
        let (name, _) = self.eat_id()?;
        let type_params = self.parse_type_params()?;
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut fields = vec![];
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            let (fname, _) = self.eat_id()?;
            self.eat(|t| matches!(t, Token::Colon { .. }), ":")?;
            let annotated_type = self.parse_type_expr()?;
            let has_default = self.eat_if(|t| matches!(t, Token::Assign { .. }));
            if has_default {
                self.parse_expr()?;
            }
            fields.push(StructField {
                name: fname,
                annotated_type,
                has_default,
            });
            if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                break;
            }
        }
        self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(StructDecl {
            id,
            name,
            type_params,
            fields,
            is_union,
            is_pub,
            span: start,
        })
    }

    fn parse_enum_decl(&mut self, is_pub: bool) -> PResult<EnumDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::EnumKeyword { .. }), "enum")?;
        let (name, _) = self.eat_id()?;
        let type_params = self.parse_type_params()?;
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut variants = vec![];
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            let (vname, _) = self.eat_id()?;
            let mut payload_types = vec![];
            if self.eat_if(|t| matches!(t, Token::LParen { .. })) {
                while !self.check(|t| matches!(t, Token::RParen { .. })) {
                    payload_types.push(self.parse_type_expr()?);
                    if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                        break;
                    }
                }
                self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
            }
            variants.push(EnumVariant {
                name: vname,
                payload_types,
            });
            if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                break;
            }
        }
        self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(EnumDecl {
            id,
            name,
            type_params,
            variants,
            is_pub,
            span: start,
        })
    }

    fn parse_behavior_decl(&mut self, is_pub: bool) -> PResult<BehaviorDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::BehaviorKeyword { .. }), "behavior")?;
        let (name, _) = self.eat_id()?;
        let mut super_behaviors = vec![];
        if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
            loop {
                let (sup, _) = self.eat_id()?;
                super_behaviors.push(sup);
                if !self.eat_if(|t| matches!(t, Token::Plus { .. })) {
                    break;
                }
            }
        }
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut assoc_types = vec![];
        let mut methods = vec![];
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            if self.eat_if(|t| matches!(t, Token::TypeKeyword { .. })) {
                let (aname, _) = self.eat_id()?;
                self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
                assoc_types.push(aname);
                continue;
            }
            self.eat(|t| matches!(t, Token::FnKeyword { .. }), "fn")?;
            let (mname, _) = self.eat_id()?;
            let type_params = self.parse_type_params()?;
            let params = self.parse_func_params()?;
            let return_type = self.parse_return_type()?;
            let default_body = if self.check(|t| matches!(t, Token::LBrace { .. })) {
                Some(self.parse_block_expr()?)
            } else {
                self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
                None
            };
            methods.push(BehaviorMethod {
                name: mname,
                type_params,
                params,
                return_type,
                default_body,
            });
        }
        self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(BehaviorDecl {
            id,
            name,
            super_behaviors,
            assoc_types,
            methods,
            is_pub,
            span: start,
        })
    }

    fn parse_impl_decl(&mut self) -> PResult<ImplDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::ImplKeyword { .. }), "impl")?;
        let type_params = self.parse_type_params()?;
        let first = self.parse_type_expr()?;
        let (behavior, behavior_type_args, target_type) =
            if self.eat_if(|t| matches!(t, Token::ForKeyword { .. })) {
                let target = self.parse_type_expr()?;
                let (name, args) = match &first {
                    TypeExpr::Name {
                        name, type_args, ..
                    } => (name.clone(), type_args.clone()),
                    _ => ("".into(), vec![]),
                };
                (Some(name), args, target)
            } else {
                (None, vec![], first)
            };
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut methods = vec![];
        let mut assoc_type_bindings = vec![];
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            if self.eat_if(|t| matches!(t, Token::TypeKeyword { .. })) {
                let (aname, _) = self.eat_id()?;
                self.eat(|t| matches!(t, Token::Assign { .. }), "=")?;
                let bound = self.parse_type_expr()?;
                self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
                assoc_type_bindings.push((aname, bound));
                continue;
            }
            let is_static = !self.check_self_receiver();
            let sig = self.parse_func_sig()?;
            let body = self.parse_block_expr()?;
            methods.push(ImplMethod {
                sig,
                body,
                is_static,
            });
        }
        self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(ImplDecl {
            id,
            behavior,
            behavior_type_args,
            target_type,
            type_params,
            assoc_type_bindings,
            methods,
            span: start,
        })
    }

    /// Looks ahead past `fn name[...]( ` to see whether the first
    /// parameter is a bare `self` receiver, without consuming tokens.
    fn check_self_receiver(&self) -> bool {
        let saved = self.state.get_index();
        let mut probe = self.state.clone();
        probe.set_index(saved);
        let mut depth = 0i32;
        let mut seen_lparen = false;
        while let Some(tok) = probe.next() {
            match tok {
                Token::LParen { .. } => {
                    depth += 1;
                    seen_lparen = true;
                    if depth == 1 {
                        return matches!(probe.peek(), Some(Token::SelfKeyword { .. }));
                    }
                }
                Token::RParen { .. } => {
                    depth -= 1;
                    if seen_lparen && depth == 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn parse_class_decl(&mut self, is_pub: bool) -> PResult<ClassDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::ClassKeyword { .. }), "class")?;
        let (name, _) = self.eat_id()?;
        let mut base = None;
        if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
            let (b, _) = self.eat_id()?;
            base = Some(b);
        }
        let mut implements = vec![];
        if self.eat_if(|t| matches!(t, Token::InstanceKeyword { .. })) {
            loop {
                let (b, _) = self.eat_id()?;
                implements.push(b);
                if !self.eat_if(|t| matches!(t, Token::Plus { .. })) {
                    break;
                }
            }
        }
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut fields = vec![];
        let mut methods = vec![];
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            if self.check(|t| matches!(t, Token::FnKeyword { .. })) {
                let is_static = !self.check_self_receiver();
                let is_virtual = true;
                let sig = self.parse_func_sig()?;
                let body = if self.check(|t| matches!(t, Token::LBrace { .. })) {
                    Some(self.parse_block_expr()?)
                } else {
                    self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
                    None
                };
                methods.push(ClassMethodSig {
                    sig,
                    body,
                    is_static,
                    is_virtual,
                });
            } else {
                let is_static = self.eat_if(|t| matches!(t, Token::Id { value, .. } if value == "static"));
                let (fname, _) = self.eat_id()?;
                self.eat(|t| matches!(t, Token::Colon { .. }), ":")?;
                let annotated_type = self.parse_type_expr()?;
                self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
                fields.push(ClassField {
                    name: fname,
                    annotated_type,
                    is_static,
                });
            }
        }
        self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(ClassDecl {
            id,
            name,
            base,
            fields,
            methods,
            implements,
            is_pub,
            span: start,
        })
    }

    fn parse_const_decl(&mut self, is_pub: bool) -> PResult<ConstDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::Const { .. }), "const")?;
        let (name, _) = self.eat_id()?;
        let annotated_type = if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.eat(|t| matches!(t, Token::Assign { .. }), "=")?;
        let value = self.parse_expr()?;
        self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
        Ok(ConstDecl {
            id,
            name,
            annotated_type,
            value,
            is_pub,
            span: start,
        })
    }

    fn parse_use_decl(&mut self) -> PResult<UseDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::UseKeyword { .. }), "use")?;
        let mut path = vec![self.eat_id()?.0];
        while self.eat_if(|t| matches!(t, Token::DoubleColon { .. })) {
            path.push(self.eat_id()?.0);
        }
        let alias = if self.eat_if(|t| matches!(t, Token::AsKeyword { .. })) {
            Some(self.eat_id()?.0)
        } else {
            None
        };
        self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
        Ok(UseDecl {
            id,
            path,
            alias,
            span: start,
        })
    }

    fn parse_type_alias_decl(&mut self, is_pub: bool) -> PResult<TypeAliasDecl> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::TypeKeyword { .. }), "type")?;
        let (name, _) = self.eat_id()?;
        let type_params = self.parse_type_params()?;
        self.eat(|t| matches!(t, Token::Assign { .. }), "=")?;
        let target_type = self.parse_type_expr()?;
        self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
        Ok(TypeAliasDecl {
            id,
            name,
            type_params,
            target_type,
            is_pub,
            span: start,
        })
    }

    // ---- type expressions ------------------------------------------------

    fn parse_type_expr(&mut self) -> PResult<TypeExpr> {
        let start = self.current_span()?;
        if self.eat_if(|t| matches!(t, Token::RefKeyword { .. })) {
            let is_mut = self.eat_if(|t| matches!(t, Token::Mut { .. }));
            let inner = Box::new(self.parse_type_expr()?);
            return Ok(TypeExpr::Ref {
                id: self.next_id(),
                is_mut,
                inner,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::Ampersand { .. })) {
            let is_mut = self.eat_if(|t| matches!(t, Token::Mut { .. }));
            let inner = Box::new(self.parse_type_expr()?);
            return Ok(TypeExpr::Ptr {
                id: self.next_id(),
                inner,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::DynKeyword { .. })) {
            let (name, _) = self.eat_id()?;
            let type_args = self.parse_optional_generic_args()?;
            return Ok(TypeExpr::Dyn {
                id: self.next_id(),
                name,
                type_args,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::LParen { .. })) {
            let mut elements = vec![];
            while !self.check(|t| matches!(t, Token::RParen { .. })) {
                elements.push(self.parse_type_expr()?);
                if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                    break;
                }
            }
            self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
            if elements.len() == 1 {
                return Ok(elements.into_iter().next().unwrap());
            }
            return Ok(TypeExpr::Tuple {
                id: self.next_id(),
                elements,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::LBracket { .. })) {
            let element = Box::new(self.parse_type_expr()?);
            if self.eat_if(|t| matches!(t, Token::Semicolon { .. })) {
                let len_tok = self.eat(|t| matches!(t, Token::Integer { .. }), "array length")?;
                let length = match len_tok {
                    Token::Integer { value, .. } => value as usize,
                    _ => unreachable!(),
                };
                self.eat(|t| matches!(t, Token::RBracket { .. }), "]")?;
                return Ok(TypeExpr::Array {
                    id: self.next_id(),
                    element,
                    length,
                    span: start,
                });
            }
            self.eat(|t| matches!(t, Token::RBracket { .. }), "]")?;
            return Ok(TypeExpr::Slice {
                id: self.next_id(),
                element,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::FnKeyword { .. })) {
            self.eat(|t| matches!(t, Token::LParen { .. }), "(")?;
            let mut params = vec![];
            while !self.check(|t| matches!(t, Token::RParen { .. })) {
                params.push(self.parse_type_expr()?);
                if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                    break;
                }
            }
            self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
            let return_type = Box::new(self.parse_return_type()?);
            return Ok(TypeExpr::Func {
                id: self.next_id(),
                params,
                return_type,
                span: start,
            });
        }
        let (name, _) = self.eat_id()?;
        let mut path = vec![];
        let mut name = name;
        while self.eat_if(|t| matches!(t, Token::DoubleColon { .. })) {
            path.push(name);
            name = self.eat_id()?.0;
        }
        let type_args = self.parse_optional_generic_args()?;
        Ok(TypeExpr::Name {
            id: self.next_id(),
            path,
            name,
            type_args,
            span: start,
        })
    }

    fn parse_optional_generic_args(&mut self) -> PResult<Vec<TypeExpr>> {
        let mut args = vec![];
        if self.eat_if(|t| matches!(t, Token::LBracket { .. })) {
            while !self.check(|t| matches!(t, Token::RBracket { .. })) {
                args.push(self.parse_type_expr()?);
                if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                    break;
                }
            }
            self.eat(|t| matches!(t, Token::RBracket { .. }), "]")?;
        }
        Ok(args)
    }

    // ---- statements & blocks ----------------------------------------------

    fn parse_block_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut statements = vec![];
        let mut trailing = None;
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            if self.check(|t| matches!(t, Token::Let { .. })) {
                statements.push(self.parse_let_stmt()?);
                continue;
            }
            let expr = self.parse_expr()?;
            if self.eat_if(|t| matches!(t, Token::Semicolon { .. })) {
                let sid = self.next_id();
                let span = expr.span().clone();
                statements.push(Stmt::Expr(ExprStmt {
                    id: sid,
                    expr: Box::new(expr),
                    span,
                }));
            } else if self.check(|t| matches!(t, Token::RBrace { .. })) {
                trailing = Some(Box::new(expr));
                break;
            } else {
                // Expression-statement without a trailing semicolon in the
                // middle of a block (e.g. a block-like `if`/`while`/`when`
                // used for its side effects) is permitted, mirroring how
                // most statement-oriented languages treat block-expressions.
                let sid = self.next_id();
                let span = expr.span().clone();
                statements.push(Stmt::Expr(ExprStmt {
                    id: sid,
                    expr: Box::new(expr),
                    span,
                }));
            }
        }
        self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(Expr::Block {
            id,
            statements,
            trailing,
            span: start,
        })
    }

    fn parse_let_stmt(&mut self) -> PResult<Stmt> {
        let start = self.current_span()?;
        let id = self.next_id();
        self.eat(|t| matches!(t, Token::Let { .. }), "let")?;
        let is_mut = self.eat_if(|t| matches!(t, Token::Mut { .. }));
        let (name, _) = self.eat_id()?;
        let annotated_type = if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.eat(|t| matches!(t, Token::Assign { .. }), "=")?;
        let value = Box::new(self.parse_expr()?);
        self.eat(|t| matches!(t, Token::Semicolon { .. }), ";")?;
        Ok(Stmt::Let(LetStmt {
            id,
            name,
            is_mut,
            annotated_type,
            value,
            span: start,
        }))
    }

    // ---- expressions: precedence climbing ---------------------------------

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    /// Parses an expression in a position immediately followed by a
    /// brace-delimited body (`if`/`while`/`when`/`for` condition or
    /// iterator), where a bare `Name {` must not be read as a struct
    /// literal.
    fn parse_condition_expr(&mut self) -> PResult<Expr> {
        let saved = self.forbid_struct_literal;
        self.forbid_struct_literal = true;
        let result = self.parse_expr();
        self.forbid_struct_literal = saved;
        result
    }

    /// Runs `f` with the struct-literal restriction lifted — used inside
    /// any bracket/paren-delimited sub-expression (call args, array
    /// elements, tuple elements, struct-literal field values) reached while
    /// `forbid_struct_literal` is set, since the ambiguity with a following
    /// block only exists at the top level of a condition.
    fn unrestricted<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = self.forbid_struct_literal;
        self.forbid_struct_literal = false;
        let result = f(self);
        self.forbid_struct_literal = saved;
        result
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_ternary()?;
        if self.eat_if(|t| matches!(t, Token::Assign { .. })) {
            let value = Box::new(self.parse_assignment()?);
            let span = lhs.span().merge(value.span());
            return Ok(Expr::Assign {
                id: self.next_id(),
                target: Box::new(lhs),
                value,
                span,
            });
        }
        Ok(lhs)
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let cond = self.parse_range()?;
        if self.eat_if(|t| matches!(t, Token::Question { .. })) {
            let then_value = Box::new(self.parse_expr()?);
            self.eat(|t| matches!(t, Token::Colon { .. }), ":")?;
            let else_value = Box::new(self.parse_expr()?);
            let span = cond.span().merge(else_value.span());
            return Ok(Expr::Ternary {
                id: self.next_id(),
                condition: Box::new(cond),
                then_value,
                else_value,
                span,
            });
        }
        Ok(cond)
    }

    fn parse_range(&mut self) -> PResult<Expr> {
        let start_span = self.current_span()?;
        let lhs = self.parse_or()?;
        if self.check(|t| matches!(t, Token::DotDot { .. })) {
            self.bump();
            let inclusive = self.eat_if(|t| matches!(t, Token::Assign { .. }));
            let has_end = !self.check(|t| {
                matches!(
                    t,
                    Token::LBrace { .. } | Token::Semicolon { .. } | Token::RParen { .. }
                )
            });
            let end = if has_end {
                Some(Box::new(self.parse_or()?))
            } else {
                None
            };
            return Ok(Expr::Range {
                id: self.next_id(),
                start: Some(Box::new(lhs)),
                end,
                inclusive,
                span: start_span,
            });
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(|t| matches!(t, Token::PipePipe { .. })) {
            self.bump();
            let rhs = self.parse_and()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                id: self.next_id(),
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.check(|t| matches!(t, Token::AmpAmp { .. })) {
            self.bump();
            let rhs = self.parse_equality()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                id: self.next_id(),
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.check(|t| matches!(t, Token::Equal { .. })) {
                BinaryOp::Eq
            } else if self.check(|t| matches!(t, Token::NotEqual { .. })) {
                BinaryOp::Neq
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_relational()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                id: self.next_id(),
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.check(|t| matches!(t, Token::LessThan { .. })) {
                BinaryOp::Lt
            } else if self.check(|t| matches!(t, Token::LessOrEqual { .. })) {
                BinaryOp::Le
            } else if self.check(|t| matches!(t, Token::GreaterThan { .. })) {
                BinaryOp::Gt
            } else if self.check(|t| matches!(t, Token::GreaterOrEqual { .. })) {
                BinaryOp::Ge
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_additive()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                id: self.next_id(),
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.check(|t| matches!(t, Token::Plus { .. })) {
                BinaryOp::Add
            } else if self.check(|t| matches!(t, Token::Minus { .. })) {
                BinaryOp::Sub
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                id: self.next_id(),
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.check(|t| matches!(t, Token::Times { .. })) {
                BinaryOp::Mul
            } else if self.check(|t| matches!(t, Token::Slash { .. })) {
                BinaryOp::Div
            } else if self.check(|t| matches!(t, Token::Percent { .. })) {
                BinaryOp::Rem
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_unary()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                id: self.next_id(),
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let start = self.current_span()?;
        if self.eat_if(|t| matches!(t, Token::Minus { .. })) {
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary {
                id: self.next_id(),
                op: UnaryOp::Neg,
                operand,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::ExclamationMark { .. })) {
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary {
                id: self.next_id(),
                op: UnaryOp::Not,
                operand,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::Times { .. })) {
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary {
                id: self.next_id(),
                op: UnaryOp::Deref,
                operand,
                span: start,
            });
        }
        if self.eat_if(|t| matches!(t, Token::Ampersand { .. })) {
            let is_mut = self.eat_if(|t| matches!(t, Token::Mut { .. }));
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary {
                id: self.next_id(),
                op: if is_mut { UnaryOp::RefMut } else { UnaryOp::Ref },
                operand,
                span: start,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_if(|t| matches!(t, Token::Dot { .. })) {
                let (name, _) = self.eat_id()?;
                if self.check(|t| matches!(t, Token::LBracket { .. } | Token::LParen { .. })) {
                    let type_args = self.parse_optional_generic_args()?;
                    self.eat(|t| matches!(t, Token::LParen { .. }), "(")?;
                    let mut args = vec![];
                    while !self.check(|t| matches!(t, Token::RParen { .. })) {
                        args.push(self.parse_expr()?);
                        if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                            break;
                        }
                    }
                    let end = self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
                    let span = expr.span().merge(&token_span(&end));
                    expr = Expr::MethodCall {
                        id: self.next_id(),
                        receiver: Box::new(expr),
                        method: name,
                        type_args,
                        args,
                        span,
                    };
                } else {
                    let span = expr.span().clone();
                    expr = Expr::Field {
                        id: self.next_id(),
                        base: Box::new(expr),
                        field: name,
                        span,
                    };
                }
                continue;
            }
            if self.check(|t| matches!(t, Token::LParen { .. })) {
                self.bump();
                let mut args = vec![];
                while !self.check(|t| matches!(t, Token::RParen { .. })) {
                    args.push(self.unrestricted(|p| p.parse_expr())?);
                    if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                        break;
                    }
                }
                let end = self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
                let span = expr.span().merge(&token_span(&end));
                expr = Expr::Call {
                    id: self.next_id(),
                    callee: Box::new(expr),
                    args,
                    span,
                };
                continue;
            }
            if self.check(|t| matches!(t, Token::LBracket { .. })) {
                self.bump();
                let index = Box::new(self.unrestricted(|p| p.parse_expr())?);
                let end = self.eat(|t| matches!(t, Token::RBracket { .. }), "]")?;
                let span = expr.span().merge(&token_span(&end));
                expr = Expr::Index {
                    id: self.next_id(),
                    base: Box::new(expr),
                    index,
                    span,
                };
                continue;
            }
            if self.check(|t| matches!(t, Token::ExclamationMark { .. })) {
                self.bump();
                let span = expr.span().clone();
                expr = Expr::Try {
                    id: self.next_id(),
                    value: Box::new(expr),
                    span,
                };
                continue;
            }
            if self.eat_if(|t| matches!(t, Token::AsKeyword { .. })) {
                let target_type = self.parse_type_expr()?;
                let span = expr.span().merge(target_type.span());
                expr = Expr::Cast {
                    id: self.next_id(),
                    value: Box::new(expr),
                    target_type,
                    span,
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.current_span()?;
        match self.peek() {
            Some(Token::Integer { value, position }) => {
                self.bump();
                Ok(Expr::Literal {
                    id: self.next_id(),
                    value: Literal::Int {
                        value: value as i128,
                        suffix: None,
                    },
                    span: position,
                })
            }
            Some(Token::FloatingPoint { value, position }) => {
                self.bump();
                Ok(Expr::Literal {
                    id: self.next_id(),
                    value: Literal::Float {
                        value,
                        suffix: None,
                    },
                    span: position,
                })
            }
            Some(Token::TrueKeyword { position }) => {
                self.bump();
                Ok(Expr::Literal {
                    id: self.next_id(),
                    value: Literal::Bool(true),
                    span: position,
                })
            }
            Some(Token::FalseKeyword { position }) => {
                self.bump();
                Ok(Expr::Literal {
                    id: self.next_id(),
                    value: Literal::Bool(false),
                    span: position,
                })
            }
            Some(Token::Character { value, position }) => {
                self.bump();
                let unescaped =
                    unescape::unescape(&unquote(&value)).unwrap_or_else(|| unquote(&value));
                let ch = unescaped.chars().next().unwrap_or('\0');
                Ok(Expr::Literal {
                    id: self.next_id(),
                    value: Literal::Char(ch),
                    span: position,
                })
            }
            Some(Token::AstString { value, position }) => {
                self.bump();
                let text = unescape::unescape(&unquote(&value)).unwrap_or_else(|| unquote(&value));
                Ok(Expr::Literal {
                    id: self.next_id(),
                    value: Literal::Str(text),
                    span: position,
                })
            }
            Some(Token::LParen { .. }) => {
                self.bump();
                let mut elements = vec![];
                while !self.check(|t| matches!(t, Token::RParen { .. })) {
                    elements.push(self.unrestricted(|p| p.parse_expr())?);
                    if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                        break;
                    }
                }
                let end = self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
                if elements.len() == 1 {
                    return Ok(elements.into_iter().next().unwrap());
                }
                Ok(Expr::Tuple {
                    id: self.next_id(),
                    elements,
                    span: start.merge(&token_span(&end)),
                })
            }
            Some(Token::LBracket { .. }) => {
                self.bump();
                let mut elements = vec![];
                while !self.check(|t| matches!(t, Token::RBracket { .. })) {
                    elements.push(self.unrestricted(|p| p.parse_expr())?);
                    if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                        break;
                    }
                }
                let end = self.eat(|t| matches!(t, Token::RBracket { .. }), "]")?;
                Ok(Expr::Array {
                    id: self.next_id(),
                    elements,
                    span: start.merge(&token_span(&end)),
                })
            }
            Some(Token::LBrace { .. }) => self.parse_block_expr(),
            Some(Token::IfKeyword { .. }) => self.parse_if_expr(),
            Some(Token::WhenKeyword { .. }) => self.parse_when_expr(),
            Some(Token::LoopKeyword { .. }) => {
                self.bump();
                let body = Box::new(self.parse_block_expr()?);
                Ok(Expr::Loop {
                    id: self.next_id(),
                    body,
                    span: start,
                })
            }
            Some(Token::WhileKeyword { .. }) => {
                self.bump();
                let condition = Box::new(self.parse_condition_expr()?);
                let body = Box::new(self.parse_block_expr()?);
                Ok(Expr::While {
                    id: self.next_id(),
                    condition,
                    body,
                    span: start,
                })
            }
            Some(Token::ForKeyword { .. }) => {
                self.bump();
                let (binding, _) = self.eat_id()?;
                self.eat(|t| matches!(t, Token::InKeyword { .. }), "in")?;
                let iterator = Box::new(self.parse_condition_expr()?);
                let body = Box::new(self.parse_block_expr()?);
                Ok(Expr::For {
                    id: self.next_id(),
                    binding,
                    iterator,
                    body,
                    span: start,
                })
            }
            Some(Token::ReturnKeyword { .. }) => {
                self.bump();
                let value = if self.check(|t| {
                    matches!(t, Token::Semicolon { .. } | Token::RBrace { .. })
                }) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                Ok(Expr::Return {
                    id: self.next_id(),
                    value,
                    span: start,
                })
            }
            Some(Token::BreakKeyword { .. }) => {
                self.bump();
                let value = if self.check(|t| {
                    matches!(t, Token::Semicolon { .. } | Token::RBrace { .. })
                }) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                Ok(Expr::Break {
                    id: self.next_id(),
                    value,
                    span: start,
                })
            }
            Some(Token::ContinueKeyword { .. }) => {
                self.bump();
                Ok(Expr::Continue {
                    id: self.next_id(),
                    span: start,
                })
            }
            Some(Token::Backslash { .. }) => self.parse_closure(),
            Some(Token::LowlevelKeyword { .. }) => {
                self.bump();
                let (intrinsic, _) = self.eat_id()?;
                self.eat(|t| matches!(t, Token::LParen { .. }), "(")?;
                let mut operands = vec![];
                while !self.check(|t| matches!(t, Token::RParen { .. })) {
                    operands.push(self.parse_expr()?);
                    if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                        break;
                    }
                }
                self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
                Ok(Expr::Lowlevel {
                    id: self.next_id(),
                    intrinsic,
                    operands,
                    span: start,
                })
            }
            Some(Token::Id { .. }) | Some(Token::SelfKeyword { .. }) => self.parse_ident_or_struct(),
            Some(tok) => Err(ParseError {
                message: format!("unexpected token in expression: {:?}", tok),
                position: Some(token_span(&tok)),
            }),
            None => Err(Self::eof_err("expression")),
        }
    }

    fn parse_ident_or_struct(&mut self) -> PResult<Expr> {
        let start = self.current_span()?;
        let name = match self.bump() {
            Some(Token::Id { value, .. }) => value,
            Some(Token::SelfKeyword { .. }) => "self".to_string(),
            _ => unreachable!(),
        };
        let mut segments = vec![name.clone()];
        while self.check(|t| matches!(t, Token::DoubleColon { .. })) {
            self.bump();
            segments.push(self.eat_id()?.0);
        }
        if segments.len() > 1 || self.check(|t| matches!(t, Token::LBracket { .. })) {
            let type_args = self.parse_optional_generic_args()?;
            if self.check(|t| matches!(t, Token::LBrace { .. })) && is_struct_init_lookahead(self) {
                return self.parse_struct_init(start, segments, type_args);
            }
            let last = segments.last().cloned().unwrap_or(name);
            let path = segments[..segments.len().saturating_sub(1)].to_vec();
            if !type_args.is_empty() || !path.is_empty() {
                return Ok(Expr::Path {
                    id: self.next_id(),
                    segments: {
                        let mut s = path;
                        s.push(last);
                        s
                    },
                    span: start,
                });
            }
        }
        if self.check(|t| matches!(t, Token::LBrace { .. })) && is_struct_init_lookahead(self) {
            return self.parse_struct_init(start, vec![name], vec![]);
        }
        Ok(Expr::Ident {
            id: self.next_id(),
            name,
            span: start,
        })
    }

    fn parse_struct_init(
        &mut self,
        start: Span,
        mut segments: Vec<String>,
        type_args: Vec<TypeExpr>,
    ) -> PResult<Expr> {
        let name = segments.pop().unwrap_or_default();
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut fields = vec![];
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            let (fname, _) = self.eat_id()?;
            let value = if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
                Box::new(self.unrestricted(|p| p.parse_expr())?)
            } else {
                Box::new(Expr::Ident {
                    id: self.next_id(),
                    name: fname.clone(),
                    span: start.clone(),
                })
            };
            fields.push(StructFieldInit { name: fname, value });
            if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                break;
            }
        }
        let end = self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(Expr::Struct {
            id: self.next_id(),
            path: segments,
            name,
            type_args,
            fields,
            span: start.merge(&token_span(&end)),
        })
    }

    fn parse_closure(&mut self) -> PResult<Expr> {
        let start = self.current_span()?;
        self.eat(|t| matches!(t, Token::Backslash { .. }), "\\")?;
        self.eat(|t| matches!(t, Token::LParen { .. }), "(")?;
        let mut params = vec![];
        while !self.check(|t| matches!(t, Token::RParen { .. })) {
            let (name, _) = self.eat_id()?;
            let annotated_type = if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            params.push(ClosureParam {
                name,
                annotated_type,
            });
            if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                break;
            }
        }
        self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
        let return_type = if self.eat_if(|t| matches!(t, Token::SmallRightArrow { .. })) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.eat(|t| matches!(t, Token::BigRightArrow { .. }), "=>")?;
        let body = Box::new(self.parse_expr()?);
        Ok(Expr::Closure {
            id: self.next_id(),
            params,
            return_type,
            body,
            span: start,
        })
    }

    fn parse_if_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span()?;
        self.eat(|t| matches!(t, Token::IfKeyword { .. }), "if")?;
        let condition = Box::new(self.parse_condition_expr()?);
        let then_branch = Box::new(self.parse_block_expr()?);
        let else_branch = if self.eat_if(|t| matches!(t, Token::ElseKeyword { .. })) {
            if self.check(|t| matches!(t, Token::IfKeyword { .. })) {
                Some(Box::new(self.parse_if_expr()?))
            } else {
                Some(Box::new(self.parse_block_expr()?))
            }
        } else {
            None
        };
        Ok(Expr::If {
            id: self.next_id(),
            condition,
            then_branch,
            else_branch,
            span: start,
        })
    }

    fn parse_when_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span()?;
        self.eat(|t| matches!(t, Token::WhenKeyword { .. }), "when")?;
        let scrutinee = Box::new(self.parse_condition_expr()?);
        self.eat(|t| matches!(t, Token::LBrace { .. }), "{")?;
        let mut arms = vec![];
        while !self.check(|t| matches!(t, Token::RBrace { .. })) {
            let arm_span = self.current_span()?;
            let pattern = self.parse_pattern()?;
            let pattern = if self.eat_if(|t| matches!(t, Token::IfKeyword { .. })) {
                let condition = Box::new(self.parse_expr()?);
                Pattern::Guarded {
                    id: self.next_id(),
                    span: pattern.span().clone(),
                    pattern: Box::new(pattern),
                    condition,
                }
            } else {
                pattern
            };
            self.eat(|t| matches!(t, Token::BigRightArrow { .. }), "=>")?;
            let body = Box::new(self.parse_expr()?);
            self.eat_if(|t| matches!(t, Token::Comma { .. }));
            arms.push(WhenArm {
                pattern,
                body,
                span: arm_span,
            });
        }
        self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
        Ok(Expr::When {
            id: self.next_id(),
            scrutinee,
            arms,
            span: start,
        })
    }

    fn parse_pattern(&mut self) -> PResult<Pattern> {
        let start = self.current_span()?;
        match self.peek() {
            Some(Token::Id { value, .. }) if value == "_" => {
                self.bump();
                Ok(Pattern::Wildcard {
                    id: self.next_id(),
                    span: start,
                })
            }
            Some(Token::Integer { value, .. }) => {
                self.bump();
                Ok(Pattern::Literal {
                    id: self.next_id(),
                    value: LiteralPattern::Int(value as i128),
                    span: start,
                })
            }
            Some(Token::TrueKeyword { .. }) => {
                self.bump();
                Ok(Pattern::Literal {
                    id: self.next_id(),
                    value: LiteralPattern::Bool(true),
                    span: start,
                })
            }
            Some(Token::FalseKeyword { .. }) => {
                self.bump();
                Ok(Pattern::Literal {
                    id: self.next_id(),
                    value: LiteralPattern::Bool(false),
                    span: start,
                })
            }
            Some(Token::Id { .. }) => {
                let (name, _) = self.eat_id()?;
                let mut path = vec![];
                let mut name = name;
                while self.eat_if(|t| matches!(t, Token::DoubleColon { .. })) {
                    path.push(name);
                    name = self.eat_id()?.0;
                }
                if self.eat_if(|t| matches!(t, Token::LParen { .. })) {
                    let mut elements = vec![];
                    while !self.check(|t| matches!(t, Token::RParen { .. })) {
                        elements.push(self.parse_pattern()?);
                        if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                            break;
                        }
                    }
                    self.eat(|t| matches!(t, Token::RParen { .. }), ")")?;
                    return Ok(Pattern::TupleStruct {
                        id: self.next_id(),
                        path,
                        name,
                        elements,
                        span: start,
                    });
                }
                if self.check(|t| matches!(t, Token::LBrace { .. })) {
                    self.bump();
                    let mut fields = vec![];
                    let mut has_rest = false;
                    while !self.check(|t| matches!(t, Token::RBrace { .. })) {
                        if self.eat_if(|t| matches!(t, Token::DotDot { .. })) {
                            has_rest = true;
                            break;
                        }
                        let (fname, _) = self.eat_id()?;
                        let pattern = if self.eat_if(|t| matches!(t, Token::Colon { .. })) {
                            self.parse_pattern()?
                        } else {
                            Pattern::Binding {
                                id: self.next_id(),
                                name: fname.clone(),
                                span: start.clone(),
                            }
                        };
                        fields.push((fname, pattern));
                        if !self.eat_if(|t| matches!(t, Token::Comma { .. })) {
                            break;
                        }
                    }
                    self.eat(|t| matches!(t, Token::RBrace { .. }), "}")?;
                    return Ok(Pattern::Struct {
                        id: self.next_id(),
                        path,
                        name,
                        fields,
                        has_rest,
                        span: start,
                    });
                }
                if path.is_empty() {
                    Ok(Pattern::Binding {
                        id: self.next_id(),
                        name,
                        span: start,
                    })
                } else {
                    Ok(Pattern::TupleStruct {
                        id: self.next_id(),
                        path,
                        name,
                        elements: vec![],
                        span: start,
                    })
                }
            }
            Some(tok) => Err(ParseError {
                message: format!("unexpected token in pattern: {:?}", tok),
                position: Some(token_span(&tok)),
            }),
            None => Err(Self::eof_err("pattern")),
        }
    }
}

fn is_struct_init_lookahead(parser: &Parser) -> bool {
    // A `{` after a bare/path identifier begins a struct literal, except
    // while parsing an `if`/`while`/`when`/`for` condition, where the same
    // `{` instead opens the construct's body (`parser.forbid_struct_literal`
    // is set for exactly that span by `parse_condition_expr`).
    !parser.forbid_struct_literal
}

fn token_span(token: &Token) -> Span {
    use crate::lexer::GetPosition;
    token.position()
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}
