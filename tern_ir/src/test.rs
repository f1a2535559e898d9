use crate::*;
use std::rc::Rc;
use tern_ast::{abi::*, decl::*, expr::*, module::*, op::Operator, ty::*};
use tern_common::span::Span;
use tern_typecheck::infer_types;

fn span() -> Span {
    Span::zero("test")
}

fn int() -> TypeDecl {
    TypeDecl::new(BaseType::Int, span())
}

fn boolean() -> TypeDecl {
    TypeDecl::new(BaseType::Bool, span())
}

fn void() -> TypeDecl {
    TypeDecl::new(BaseType::Void, span())
}

fn builtin_module() -> Module {
    let mut m = Module::new(0);
    let binary = |name: &str| {
        Function::built_in(
            name,
            vec![
                Variable::new("x0", int(), span()),
                Variable::new("x1", int(), span()),
            ],
            int(),
        )
    };
    for op in ["+", "-", "*", "/"] {
        m.add_function(binary(op));
    }
    m.add_function(Function::built_in(
        "?",
        vec![
            Variable::new("x0", boolean(), span()),
            Variable::new("x1", int(), span()),
            Variable::new("x2", int(), span()),
        ],
        int(),
    ));
    m
}

fn empty_program() -> Program {
    let mut library = ModuleLibrary::new();
    library.register(Rc::new(builtin_module()));
    Program::new(library)
}

fn function(name: &str, args: Vec<(&str, TypeDecl)>, result: TypeDecl, body: Expr) -> Function {
    let mut f = Function::new(name, result, span());
    for (arg_name, ty) in args {
        f = f.with_arg(arg_name, ty);
    }
    f.with_body(body)
}

fn compiled(mut program: Program) -> CompiledProgram {
    infer_types(&mut program);
    assert!(
        !program.failed(),
        "program failed to check: {:?}",
        program.diags.sorted()
    );
    lower_program(&program)
}

#[test]
fn field_reads_feed_the_integer_add() {
    let mut program = empty_program();

    let point = Structure::new("P", span())
        .with_field("x", int(), span())
        .with_field("y", int(), span());
    let id = program.add_structure(point).unwrap();

    program.add_variable(Variable::new("g", int(), span()).with_init(Expr::int(5, span())));

    let body = Expr::ret(
        Some(Expr::op2(
            Operator::Add,
            Expr::field(Expr::var("a", span()), "x", span()),
            Expr::field(Expr::var("a", span()), "y", span()),
            span(),
        )),
        span(),
    );
    program.add_function(function(
        "sum",
        vec![("a", TypeDecl::structure(id, span()))],
        int(),
        body,
    ));

    let compiled = compiled(program);

    assert_eq!(1, compiled.globals.len());
    let g = &compiled.globals[0];
    assert_eq!("g", g.name);
    assert_eq!(0, g.index);
    assert_eq!(4, g.size);
    match &g.init {
        Some(ExecNode::CopyValue { kind, left, right }) => {
            assert_eq!(BaseType::Int, *kind);
            assert!(matches!(&**left, ExecNode::GetGlobal { index: 0 }));
            assert!(matches!(&**right, ExecNode::Const(ConstValue::Int(5))));
        }
        other => panic!("expected global init copy, got {:?}", other),
    }

    assert_eq!(1, compiled.functions.len());
    let sum = &compiled.functions[0];
    assert_eq!("sum", sum.name);
    assert_eq!(PROLOGUE_SIZE, sum.stack_size);
    assert_eq!(1, sum.debug.args.len());

    // return (+ (-> (field a 0)) (-> (field a 4)))
    match &sum.code {
        ExecNode::Return { sub: Some(sub) } => match &**sub {
            ExecNode::Op2 { func, left, right } => {
                assert_eq!("+ int int", func);
                for (side, offset) in [(left, 0), (right, 4)] {
                    match &**side {
                        ExecNode::Ref2Value { kind, sub } => {
                            assert_eq!(BaseType::Int, *kind);
                            match &**sub {
                                ExecNode::Field { base, offset: field_offset } => {
                                    assert_eq!(offset, *field_offset);
                                    assert!(matches!(
                                        &**base,
                                        ExecNode::GetArgument { index: 0 }
                                    ));
                                }
                                other => panic!("expected field access, got {:?}", other),
                            }
                        }
                        other => panic!("expected dereference, got {:?}", other),
                    }
                }
            }
            other => panic!("expected add node, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn single_statement_blocks_collapse() {
    let mut program = empty_program();
    program.add_function(function(
        "one",
        vec![],
        void(),
        Expr::block(vec![Expr::int(1, span())], span()),
    ));
    program.add_function(function(
        "two",
        vec![],
        void(),
        Expr::block(vec![Expr::int(1, span()), Expr::int(2, span())], span()),
    ));

    let compiled = compiled(program);
    assert!(matches!(compiled.functions[0].code, ExecNode::Const(_)));
    match &compiled.functions[1].code {
        ExecNode::Block { list } => assert_eq!(2, list.len()),
        other => panic!("expected block, got {:?}", other),
    }
}

#[test]
fn let_lowers_initializer_copies_and_zero_fills() {
    let mut program = empty_program();
    let body = Expr::let_in(
        vec![
            Variable::new("a", int(), span()).with_init(Expr::int(7, span())),
            Variable::new("b", int(), span()),
        ],
        Expr::block(Vec::new(), span()),
        span(),
    );
    program.add_function(function("locals", vec![], void(), body));

    let compiled = compiled(program);
    match &compiled.functions[0].code {
        ExecNode::Let { inits, body: _ } => {
            assert_eq!(2, inits.len());
            match &inits[0] {
                ExecNode::CopyValue { kind, left, right } => {
                    assert_eq!(BaseType::Int, *kind);
                    assert!(matches!(
                        &**left,
                        ExecNode::GetLocal { stack_top } if *stack_top == PROLOGUE_SIZE
                    ));
                    assert!(matches!(&**right, ExecNode::Const(ConstValue::Int(7))));
                }
                other => panic!("expected init copy, got {:?}", other),
            }
            match &inits[1] {
                ExecNode::InitLocal { stack_top, size } => {
                    assert_eq!(PROLOGUE_SIZE + STACK_ALIGN, *stack_top);
                    assert_eq!(4, *size);
                }
                other => panic!("expected zero fill, got {:?}", other),
            }
        }
        other => panic!("expected let node, got {:?}", other),
    }
}

#[test]
fn for_loops_specialize_by_source_count() {
    let mut program = empty_program();
    program.add_variable(Variable::new("xs", int().with_dim(4), span()));
    program.add_variable(Variable::new("ys", int().with_dim(4), span()));

    let one = Expr::for_loop(
        vec!["x".to_string()],
        vec![Expr::var("xs", span())],
        None,
        Expr::block(Vec::new(), span()),
        span(),
    );
    let two = Expr::for_loop(
        vec!["x".to_string(), "y".to_string()],
        vec![Expr::var("xs", span()), Expr::var("ys", span())],
        None,
        Expr::block(Vec::new(), span()),
        span(),
    );
    program.add_function(function("walk", vec![], void(), Expr::block(vec![one, two], span())));

    let compiled = compiled(program);
    match &compiled.functions[0].code {
        ExecNode::Block { list } => {
            match &list[0] {
                ExecNode::For1(node) => {
                    assert_eq!(4, node.count);
                    assert_eq!([4], node.strides);
                    assert_eq!([4], node.sizes);
                    assert_eq!([PROLOGUE_SIZE], node.stack_tops);
                }
                other => panic!("expected one-source loop, got {:?}", other),
            }
            match &list[1] {
                ExecNode::For2(node) => {
                    assert_eq!(4, node.count);
                    assert_eq!(
                        [PROLOGUE_SIZE, PROLOGUE_SIZE + STACK_ALIGN],
                        node.stack_tops
                    );
                }
                other => panic!("expected two-source loop, got {:?}", other),
            }
        }
        other => panic!("expected block, got {:?}", other),
    }
}

#[test]
fn ternary_lowers_to_a_lazy_select() {
    let mut program = empty_program();
    let body = Expr::ret(
        Some(Expr::op3(
            Operator::Is,
            Expr::constant(ConstValue::Bool(true), span()),
            Expr::int(1, span()),
            Expr::int(2, span()),
            span(),
        )),
        span(),
    );
    program.add_function(function("pick", vec![], int(), body));

    let compiled = compiled(program);
    match &compiled.functions[0].code {
        ExecNode::Return { sub: Some(sub) } => match &**sub {
            ExecNode::Select {
                kind,
                cond,
                if_true,
                if_false,
            } => {
                assert_eq!(BaseType::Int, *kind);
                assert!(matches!(&**cond, ExecNode::Const(ConstValue::Bool(true))));
                assert!(matches!(&**if_true, ExecNode::Const(ConstValue::Int(1))));
                assert!(matches!(&**if_false, ExecNode::Const(ConstValue::Int(2))));
            }
            other => panic!("expected select, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn calls_record_target_index_and_reserved_region() {
    let mut program = empty_program();
    program.add_function(function(
        "id",
        vec![("x", int())],
        int(),
        Expr::ret(Some(Expr::var("x", span())), span()),
    ));
    program.add_function(function(
        "main",
        vec![],
        int(),
        Expr::ret(
            Some(Expr::call("id", vec![Expr::int(3, span())], span())),
            span(),
        ),
    ));

    let compiled = compiled(program);
    let id_index = compiled
        .functions
        .iter()
        .position(|f| f.name == "id")
        .unwrap() as u32;

    let main = compiled.functions.iter().find(|f| f.name == "main").unwrap();
    match &main.code {
        ExecNode::Return { sub: Some(sub) } => match &**sub {
            ExecNode::Call {
                target,
                stack_top,
                args,
            } => {
                assert_eq!(CallTarget::Function(id_index), *target);
                assert_eq!(PROLOGUE_SIZE, *stack_top);
                assert_eq!(1, args.len());
            }
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn sizeof_folds_to_a_constant() {
    let mut program = empty_program();
    program.add_function(function(
        "bytes",
        vec![],
        int(),
        Expr::ret(Some(Expr::size_of_type(int().with_dim(8), span())), span()),
    ));

    let compiled = compiled(program);
    match &compiled.functions[0].code {
        ExecNode::Return { sub: Some(sub) } => {
            assert!(matches!(&**sub, ExecNode::Const(ConstValue::Int(32))))
        }
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn intrinsic_forms_lower_to_their_node_shapes() {
    let mut program = empty_program();
    program.add_variable(Variable::new("xs", TypeDecl::array_of(int(), span()), span()));
    program.add_variable(Variable::new("g", int(), span()));

    let push = program.make_call(
        "push",
        vec![Expr::var("xs", span()), Expr::int(1, span())],
        span(),
    );
    let assert_form = program.make_call(
        "assert",
        vec![
            Expr::constant(ConstValue::Bool(true), span()),
            Expr::constant(ConstValue::String("must hold".to_string()), span()),
        ],
        span(),
    );
    let debug_form = program.make_call(
        "debug",
        vec![
            Expr::var("g", span()),
            Expr::constant(ConstValue::String("tag".to_string()), span()),
        ],
        span(),
    );
    let guarded = Expr::try_catch(
        Expr::block(Vec::new(), span()),
        Expr::block(Vec::new(), span()),
        span(),
    );

    let body = Expr::block(vec![push, assert_form, debug_form, guarded], span());
    program.add_function(function("main", vec![], void(), body));

    let compiled = compiled(program);
    let list = match &compiled.functions[0].code {
        ExecNode::Block { list } => list,
        other => panic!("expected block, got {:?}", other),
    };

    match &list[0] {
        ExecNode::ArrayPushValue { kind, at, .. } => {
            assert_eq!(BaseType::Int, *kind);
            assert!(at.is_none());
        }
        other => panic!("expected push, got {:?}", other),
    }
    match &list[1] {
        ExecNode::Assert { message, .. } => assert_eq!("must hold", message),
        other => panic!("expected assert, got {:?}", other),
    }
    match &list[2] {
        ExecNode::Debug { info, message, .. } => {
            assert_eq!(BaseType::Int, info.base);
            assert!(info.is_ref);
            assert_eq!("tag", message);
        }
        other => panic!("expected debug node, got {:?}", other),
    }
    assert!(matches!(&list[3], ExecNode::TryCatch { .. }));
}

#[test]
fn structure_descriptors_are_memoized_by_name() {
    let mut program = empty_program();
    let id = program
        .add_structure(Structure::new("P", span()).with_field("x", int(), span()))
        .unwrap();
    program
        .this_module
        .add_variable(Variable::new("p", TypeDecl::structure(id, span()), span()));
    program
        .this_module
        .add_variable(Variable::new("q", TypeDecl::structure(id, span()), span()));

    let compiled = compiled(program);

    let p_info = compiled.globals[0].debug.info.structure.as_ref().unwrap();
    let q_info = compiled.globals[1].debug.info.structure.as_ref().unwrap();
    assert!(Rc::ptr_eq(p_info, q_info));
    assert_eq!("P", p_info.name);
    assert_eq!(1, p_info.fields.len());
}
